//! Remote data sources consumed by the engine.
//!
//! These traits are the seam between the engine and the network: the
//! resolver, update checker and installer only ever see trait objects, so
//! tests can substitute in-memory fakes.

use super::github::{GitHubAsset, GitHubRelease};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Repository release API plus raw file access.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// All releases of `repo`, newest first as the API orders them.
    async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>>;

    /// The release the API designates as latest, if any.
    async fn latest_release(&self, repo: &str) -> Result<Option<GitHubRelease>>;

    async fn release_by_tag(&self, repo: &str, tag: &str) -> Result<Option<GitHubRelease>>;

    /// Download an asset as text.
    async fn fetch_asset(&self, asset: &GitHubAsset) -> Result<String>;

    /// Read `path` from `repo` at `git_ref` without going through releases.
    async fn read_raw_file(&self, repo: &str, git_ref: &str, path: &str) -> Result<String>;
}

/// The official aggregate version feed.
#[async_trait]
pub trait OfficialFeedSource: Send + Sync {
    /// Map of extension id to latest official version.
    async fn fetch_official_versions(&self) -> Result<BTreeMap<String, String>>;
}

/// One entry of the community index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityEntry {
    pub id: String,
    #[serde(alias = "repositoryIdentifier")]
    pub repo: String,
}

/// The community-maintained id to repository index.
#[async_trait]
pub trait CommunityIndexSource: Send + Sync {
    async fn fetch_community_index(&self) -> Result<Vec<CommunityEntry>>;
}
