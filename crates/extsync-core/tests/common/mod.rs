//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use extsync_core::network::{
    CommunityEntry, CommunityIndexSource, GitHubAsset, GitHubRelease, OfficialFeedSource,
    ReleaseSource,
};
use extsync_core::{ExtSync, MemoryHost, Result, SyncError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SELF_ID: &str = "extsync";

#[derive(Default)]
pub struct FakeOfficial {
    pub versions: BTreeMap<String, String>,
}

#[async_trait]
impl OfficialFeedSource for FakeOfficial {
    async fn fetch_official_versions(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.versions.clone())
    }
}

#[derive(Default)]
pub struct FakeIndex {
    pub entries: Vec<CommunityEntry>,
    pub calls: AtomicUsize,
}

impl FakeIndex {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(id, repo)| CommunityEntry {
                    id: id.to_string(),
                    repo: repo.to_string(),
                })
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CommunityIndexSource for FakeIndex {
    async fn fetch_community_index(&self) -> Result<Vec<CommunityEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.clone())
    }
}

/// Releases, asset bodies and raw repository files held in memory.
#[derive(Default)]
pub struct FakeReleases {
    releases: Mutex<HashMap<String, Vec<GitHubRelease>>>,
    assets: Mutex<HashMap<String, String>>,
    raw: Mutex<HashMap<String, String>>,
}

impl FakeReleases {
    /// Add a release whose assets are `(name, body)` pairs.
    pub fn add_release(&self, repo: &str, tag: &str, prerelease: bool, assets: &[(&str, &str)]) {
        let mut listed = Vec::new();
        for (name, body) in assets {
            let url = format!("mem://{}/{}/{}", repo, tag, name);
            self.assets
                .lock()
                .unwrap()
                .insert(url.clone(), body.to_string());
            listed.push(GitHubAsset {
                name: name.to_string(),
                browser_download_url: url,
            });
        }
        self.releases
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default()
            .push(GitHubRelease {
                tag_name: tag.to_string(),
                name: None,
                prerelease,
                draft: false,
                assets: listed,
            });
    }

    pub fn add_raw_file(&self, repo: &str, git_ref: &str, path: &str, body: &str) {
        self.raw
            .lock()
            .unwrap()
            .insert(format!("{}@{}/{}", repo, git_ref, path), body.to_string());
    }
}

#[async_trait]
impl ReleaseSource for FakeReleases {
    async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .get(repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_release(&self, repo: &str) -> Result<Option<GitHubRelease>> {
        Ok(self
            .list_releases(repo)
            .await?
            .into_iter()
            .find(|r| !r.prerelease))
    }

    async fn release_by_tag(&self, repo: &str, tag: &str) -> Result<Option<GitHubRelease>> {
        Ok(self
            .list_releases(repo)
            .await?
            .into_iter()
            .find(|r| r.tag_name == tag))
    }

    async fn fetch_asset(&self, asset: &GitHubAsset) -> Result<String> {
        self.assets
            .lock()
            .unwrap()
            .get(&asset.browser_download_url)
            .cloned()
            .ok_or_else(|| SyncError::NotFound {
                what: asset.browser_download_url.clone(),
            })
    }

    async fn read_raw_file(&self, repo: &str, git_ref: &str, path: &str) -> Result<String> {
        let key = format!("{}@{}/{}", repo, git_ref, path);
        self.raw
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(SyncError::NotFound { what: key })
    }
}

/// An engine over a memory host, with fakes for every remote source.
pub struct TestEnv {
    pub temp: TempDir,
    pub host: Arc<MemoryHost>,
    pub official: Arc<FakeOfficial>,
    pub index: Arc<FakeIndex>,
    pub releases: Arc<FakeReleases>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_sources(FakeOfficial::default(), FakeIndex::default())
    }

    pub fn with_sources(official: FakeOfficial, index: FakeIndex) -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            host: Arc::new(MemoryHost::new(SELF_ID)),
            official: Arc::new(official),
            index: Arc::new(index),
            releases: Arc::new(FakeReleases::default()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp.path()
    }

    pub fn mirror_dir(&self) -> std::path::PathBuf {
        self.temp.path().join("mirror")
    }

    pub async fn build(&self) -> ExtSync {
        ExtSync::builder(self.data_dir())
            .host(self.host.clone())
            .with_official_feed(self.official.clone())
            .with_community_index(self.index.clone())
            .with_release_source(self.releases.clone())
            .mirror_dir(self.mirror_dir())
            .build()
            .await
            .unwrap()
    }
}

/// Replace the value of one front-matter key, keeping every other line.
pub fn set_key(document: &str, key: &str, value: &str) -> String {
    let prefix = format!("{}:", key);
    let mut replaced = false;
    let lines: Vec<String> = document
        .split('\n')
        .map(|line| {
            if !replaced && line.starts_with(&prefix) {
                replaced = true;
                format!("{} {}", prefix, value)
            } else {
                line.to_string()
            }
        })
        .collect();
    assert!(replaced, "key {} not found in document", key);
    lines.join("\n")
}
