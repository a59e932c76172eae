//! GitHub releases client.
//!
//! Release lists are memoized in memory for about one check cycle so that a
//! batch check followed by an install does not hit the API twice.

use super::client::HttpClient;
use super::retry::{retry_async, RetryPolicy};
use super::sources::ReleaseSource;
use crate::config::NetworkConfig;
use crate::{Result, SyncError};
use async_trait::async_trait;
use mini_moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    pub fn asset(&self, name: &str) -> Option<&GitHubAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

pub struct GitHubClient {
    http: Arc<HttpClient>,
    releases: Cache<String, Vec<GitHubRelease>>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_ttl(http, NetworkConfig::GITHUB_RELEASES_TTL)
    }

    pub fn with_ttl(http: Arc<HttpClient>, ttl: Duration) -> Self {
        Self {
            http,
            releases: Cache::builder().time_to_live(ttl).max_capacity(256).build(),
            retry: RetryPolicy::default(),
        }
    }

    /// Drop the memoized release list of `repo`.
    pub fn invalidate(&self, repo: &str) {
        self.releases.invalidate(&repo.to_string());
    }

    fn api_url(path: &str) -> String {
        format!("{}/repos/{}", NetworkConfig::GITHUB_API_BASE, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let http = self.http.clone();
        retry_async(&self.retry, url, || {
            let http = http.clone();
            let url = url.to_string();
            async move { http.get_json(&url, NetworkConfig::GITHUB_ACCEPT).await }
        })
        .await
    }

    /// Like `get_json`, but a 404 becomes `None`.
    async fn get_optional<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(SyncError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        let key = repo.to_string();
        if let Some(releases) = self.releases.get(&key) {
            debug!("GitHub releases cache hit for {}", repo);
            return Ok(releases);
        }

        let url = Self::api_url(&format!(
            "{}/releases?per_page={}",
            repo,
            NetworkConfig::GITHUB_RELEASES_PER_PAGE
        ));
        let releases: Vec<GitHubRelease> = self
            .get_json::<Vec<GitHubRelease>>(&url)
            .await?
            .into_iter()
            .filter(|r| !r.draft)
            .collect();

        info!("Fetched {} releases from GitHub for {}", releases.len(), repo);
        self.releases.insert(key, releases.clone());
        Ok(releases)
    }

    async fn latest_release(&self, repo: &str) -> Result<Option<GitHubRelease>> {
        self.get_optional(&Self::api_url(&format!("{}/releases/latest", repo)))
            .await
    }

    async fn release_by_tag(&self, repo: &str, tag: &str) -> Result<Option<GitHubRelease>> {
        self.get_optional(&Self::api_url(&format!("{}/releases/tags/{}", repo, tag)))
            .await
    }

    async fn fetch_asset(&self, asset: &GitHubAsset) -> Result<String> {
        let http = self.http.clone();
        let url = asset.browser_download_url.clone();
        retry_async(&self.retry, &asset.name, || {
            let http = http.clone();
            let url = url.clone();
            async move { http.get_text(&url).await }
        })
        .await
    }

    async fn read_raw_file(&self, repo: &str, git_ref: &str, path: &str) -> Result<String> {
        let url = format!(
            "{}/{}/{}/{}",
            NetworkConfig::GITHUB_RAW_BASE,
            repo,
            git_ref,
            path
        );
        let http = self.http.clone();
        retry_async(&self.retry, &url, || {
            let http = http.clone();
            let url = url.clone();
            async move { http.get_text(&url).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_deserializes_api_shape() {
        let json = r#"{
            "tag_name": "1.2.0",
            "name": null,
            "prerelease": false,
            "draft": false,
            "html_url": "https://github.com/acme/sample-ext/releases/tag/1.2.0",
            "assets": [
                { "name": "main.js", "size": 10,
                  "browser_download_url": "https://github.com/acme/sample-ext/releases/download/1.2.0/main.js" }
            ]
        }"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "1.2.0");
        assert!(release.asset("main.js").is_some());
        assert!(release.asset("styles.css").is_none());
    }

    #[tokio::test]
    async fn test_memoized_releases_skip_network() {
        let http = Arc::new(HttpClient::new(None).unwrap());
        let client = GitHubClient::new(http);
        let cached = vec![GitHubRelease {
            tag_name: "1.0.0".into(),
            name: None,
            prerelease: false,
            draft: false,
            assets: vec![],
        }];
        client.releases.insert("acme/sample-ext".into(), cached.clone());

        assert_eq!(client.list_releases("acme/sample-ext").await.unwrap(), cached);
        client.invalidate("acme/sample-ext");
        assert!(client.releases.get(&"acme/sample-ext".to_string()).is_none());
    }
}
