//! HTTP client with rate limit awareness.
//!
//! Wraps reqwest with:
//! - Rate limit tracking from `X-RateLimit-*` response headers
//! - Throttling when the remaining budget runs low
//! - Bearer token authentication for the GitHub API host only
//! - Status mapping into [`SyncError`] (429 and exhausted 403 become
//!   `RateLimited`, 404 becomes `NotFound`)

use crate::config::NetworkConfig;
use crate::{Result, SyncError};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Rate limit state extracted from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    /// Unix timestamp when the budget resets.
    pub reset: Option<u64>,
}

impl RateLimitState {
    /// True when less than 10% of the budget is left.
    pub fn should_throttle(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => remaining < (limit / 10).max(1),
            _ => false,
        }
    }

    pub fn time_until_reset(&self) -> Option<Duration> {
        let reset = self.reset?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        (reset > now).then(|| Duration::from_secs(reset - now))
    }
}

/// HTTP client shared by the GitHub client and the feed sources.
pub struct HttpClient {
    client: Client,
    token: Option<String>,
    rate_limit_remaining: AtomicI64,
    rate_limit_limit: AtomicU64,
    rate_limit_reset: AtomicU64,
    throttle_delay: Duration,
}

impl HttpClient {
    /// Create a client, authenticating with `token` when given.
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_timeout(token, NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| SyncError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
            rate_limit_remaining: AtomicI64::new(-1),
            rate_limit_limit: AtomicU64::new(0),
            rate_limit_reset: AtomicU64::new(0),
            throttle_delay: Duration::from_millis(500),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        let limit = self.rate_limit_limit.load(Ordering::SeqCst);
        let reset = self.rate_limit_reset.load(Ordering::SeqCst);
        RateLimitState {
            remaining: u64::try_from(remaining).ok(),
            limit: (limit > 0).then_some(limit),
            reset: (reset > 0).then_some(reset),
        }
    }

    /// GET `url` with the given `Accept` header. Non-success statuses are
    /// mapped to errors.
    pub async fn get(&self, url: &str, accept: &str) -> Result<Response> {
        self.maybe_throttle().await;

        let mut request = self.client.get(url).header(header::ACCEPT, accept);
        let token = self.token_for(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(NetworkConfig::REQUEST_TIMEOUT)
            } else {
                SyncError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        })?;

        self.update_rate_limits(&response);
        self.check_response_status(response, url, token.is_some())
    }

    /// The token, if `url` points at a host allowed to receive it.
    fn token_for(&self, url: &str) -> Option<&str> {
        let token = self.token.as_deref()?;
        let parsed = url::Url::parse(url).ok()?;
        let trusted = parsed.scheme() == "https"
            && parsed
                .host_str()
                .is_some_and(|host| NetworkConfig::AUTHENTICATED_HOSTS.contains(&host));
        trusted.then_some(token)
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url, "*/*").await?;
        response.text().await.map_err(|e| SyncError::Network {
            message: format!("Failed to read body of {}: {}", url, e),
            source: Some(e),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, accept: &str) -> Result<T> {
        let response = self.get(url, accept).await?;
        let bytes = response.bytes().await.map_err(|e| SyncError::Network {
            message: format!("Failed to read body of {}: {}", url, e),
            source: Some(e),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::Json {
            message: format!("Failed to parse response from {}: {}", url, e),
            source: Some(e),
        })
    }

    async fn maybe_throttle(&self) {
        let state = self.rate_limit_state();
        if state.should_throttle() {
            warn!(
                "Rate limit approaching (remaining: {:?}/{:?}), throttling for {:?}",
                state.remaining, state.limit, self.throttle_delay
            );
            tokio::time::sleep(self.throttle_delay).await;
        }
    }

    fn update_rate_limits(&self, response: &Response) {
        let headers = response.headers();
        let read = |name: &str| -> Option<i64> { headers.get(name)?.to_str().ok()?.parse().ok() };

        if let Some(remaining) = read("X-RateLimit-Remaining") {
            self.rate_limit_remaining.store(remaining, Ordering::SeqCst);
        }
        if let Some(limit) = read("X-RateLimit-Limit") {
            self.rate_limit_limit
                .store(limit.max(0) as u64, Ordering::SeqCst);
        }
        if let Some(reset) = read("X-RateLimit-Reset") {
            self.rate_limit_reset
                .store(reset.max(0) as u64, Ordering::SeqCst);
        }

        let state = self.rate_limit_state();
        if let (Some(remaining), Some(limit)) = (state.remaining, state.limit) {
            debug!("Rate limit: {}/{}", remaining, limit);
        }
    }

    fn check_response_status(
        &self,
        response: Response,
        url: &str,
        authenticated: bool,
    ) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let exhausted = status == StatusCode::FORBIDDEN
            && self.rate_limit_remaining.load(Ordering::SeqCst) == 0;
        if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
            if let Some(wait) = self.rate_limit_state().time_until_reset() {
                warn!("Rate limited by {}, resets in {:?}", extract_domain(url), wait);
            }
            return Err(SyncError::RateLimited {
                service: extract_domain(url),
                authenticated,
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound {
                what: url.to_string(),
            });
        }

        Err(SyncError::GitHubApi {
            message: format!("GET {} returned {}", url, status),
            status_code: Some(status.as_u16()),
        })
    }
}

/// Extract the host part of a URL for messages.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_state_throttle() {
        let low = RateLimitState {
            remaining: Some(5),
            limit: Some(100),
            reset: None,
        };
        assert!(low.should_throttle());

        let plenty = RateLimitState {
            remaining: Some(50),
            limit: Some(100),
            reset: None,
        };
        assert!(!plenty.should_throttle());
        assert!(!RateLimitState::default().should_throttle());
    }

    #[test]
    fn test_reset_in_the_past_has_no_wait() {
        let state = RateLimitState {
            remaining: Some(0),
            limit: Some(60),
            reset: Some(1),
        };
        assert!(state.time_until_reset().is_none());
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://api.github.com/repos/acme/sample-ext"),
            "api.github.com"
        );
        assert_eq!(extract_domain("not a url"), "unknown");
    }

    #[tokio::test]
    async fn test_blank_token_is_anonymous() {
        let client = HttpClient::new(Some("   ".into())).unwrap();
        assert!(!client.is_authenticated());
        assert_eq!(client.rate_limit_state().remaining, None);

        let client = HttpClient::new(Some("ghp_abc".into())).unwrap();
        assert!(client.is_authenticated());
    }

    #[test]
    fn test_token_only_sent_to_github_api() {
        let client = HttpClient::new(Some("ghp_abc".into())).unwrap();
        assert_eq!(
            client.token_for("https://api.github.com/repos/acme/sample-ext/releases"),
            Some("ghp_abc")
        );
        assert_eq!(client.token_for("https://releases.obsidian.md/stats/plugin"), None);
        assert_eq!(
            client.token_for("https://raw.githubusercontent.com/acme/sample-ext/HEAD/manifest.json"),
            None
        );
        assert_eq!(client.token_for("http://api.github.com/repos/acme/x"), None);
        assert_eq!(client.token_for("https://api.github.com.evil.test/x"), None);
        assert_eq!(client.token_for("not a url"), None);
    }

    /// Serve one request with an empty JSON object and hand back its raw text.
    async fn capture_one_request() -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/feed", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}")
                .await
                .unwrap();
            String::from_utf8_lossy(&raw).to_lowercase()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_feed_request_carries_no_token() {
        let (url, server) = capture_one_request().await;
        let client = HttpClient::new(Some("ghp_secret".into())).unwrap();
        let body: serde_json::Value = client.get_json(&url, "application/json").await.unwrap();
        assert_eq!(body, serde_json::json!({}));

        let request = server.await.unwrap();
        assert!(request.starts_with("get /feed"));
        assert!(!request.contains("authorization"));
        assert!(!request.contains("ghp_secret"));
    }
}
