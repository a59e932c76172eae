//! Official version feed and community index over HTTP.

use super::client::HttpClient;
use super::retry::{retry_async, RetryPolicy};
use super::sources::{CommunityEntry, CommunityIndexSource, OfficialFeedSource};
use crate::config::NetworkConfig;
use crate::version::latest_version;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Reduce the official feed to `id -> latest version`.
///
/// Each entry is an object keyed by version string, plus the reserved
/// metadata keys, which are ignored. Entries without any version are left out.
pub fn parse_official_feed(feed: &Value) -> BTreeMap<String, String> {
    let Some(entries) = feed.as_object() else {
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(id, entry)| {
            let versions = entry.as_object()?.keys().map(String::as_str).filter(|k| {
                !NetworkConfig::OFFICIAL_FEED_RESERVED_KEYS
                    .iter()
                    .any(|reserved| *reserved == *k)
            });
            latest_version(versions).map(|v| (id.clone(), v.to_string()))
        })
        .collect()
}

/// HTTP-backed official feed and community index.
pub struct RemoteFeeds {
    http: Arc<HttpClient>,
    official_url: String,
    community_url: String,
    retry: RetryPolicy,
}

impl RemoteFeeds {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_urls(
            http,
            NetworkConfig::OFFICIAL_FEED_URL,
            NetworkConfig::COMMUNITY_INDEX_URL,
        )
    }

    pub fn with_urls(
        http: Arc<HttpClient>,
        official_url: impl Into<String>,
        community_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            official_url: official_url.into(),
            community_url: community_url.into(),
            retry: RetryPolicy::default(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Value> {
        let http = self.http.clone();
        retry_async(&self.retry, url, || {
            let http = http.clone();
            let url = url.to_string();
            async move { http.get_json::<Value>(&url, "application/json").await }
        })
        .await
    }
}

#[async_trait]
impl OfficialFeedSource for RemoteFeeds {
    async fn fetch_official_versions(&self) -> Result<BTreeMap<String, String>> {
        let feed = self.fetch(&self.official_url).await?;
        let versions = parse_official_feed(&feed);
        debug!("Official feed lists {} extensions", versions.len());
        Ok(versions)
    }
}

#[async_trait]
impl CommunityIndexSource for RemoteFeeds {
    async fn fetch_community_index(&self) -> Result<Vec<CommunityEntry>> {
        let raw = self.fetch(&self.community_url).await?;
        let entries: Vec<CommunityEntry> = serde_json::from_value(raw)?;
        info!("Community index lists {} extensions", entries.len());
        Ok(entries)
    }
}
