//! Update availability per extension.
//!
//! Two tiers: the official feed is authoritative when it lists an id; the
//! repository's release list is still attached for display. Otherwise the
//! repository resolved for the id is consulted: the first stable release in
//! API order, else the first release at all, else the version in the
//! repository's manifest at its default branch.

use crate::cancel::{CancellationToken, ProgressSink};
use crate::config::{AssetConfig, NetworkConfig};
use crate::events::{EventBus, SyncEvent};
use crate::host::ExtensionHost;
use crate::network::{GitHubRelease, OfficialFeedSource, ReleaseSource};
use crate::registry::Registry;
use crate::resolver::RepoResolver;
use crate::version::is_newer;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSource {
    Official,
    Repository,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseVersion {
    pub version: String,
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    pub source: VersionSource,
    pub local_version: String,
    pub remote_version: Option<String>,
    pub has_update: Option<bool>,
    pub repository: Option<String>,
    pub available_versions: Vec<ReleaseVersion>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl VersionStatus {
    fn new(source: VersionSource, local_version: String) -> Self {
        Self {
            source,
            local_version,
            remote_version: None,
            has_update: None,
            repository: None,
            available_versions: Vec::new(),
            error: None,
            checked_at: Utc::now(),
        }
    }

    fn set_remote(&mut self, remote: String) {
        self.has_update = Some(is_newer(&remote, &self.local_version));
        self.remote_version = Some(remote);
    }
}

fn release_versions(releases: &[GitHubRelease]) -> Vec<ReleaseVersion> {
    releases
        .iter()
        .map(|r| ReleaseVersion {
            version: r.tag_name.clone(),
            prerelease: r.prerelease,
        })
        .collect()
}

/// First stable release in API order, else the first release.
pub fn pick_candidate(releases: &[GitHubRelease]) -> Option<&GitHubRelease> {
    releases
        .iter()
        .find(|r| !r.prerelease)
        .or_else(|| releases.first())
}

pub struct UpdateChecker {
    registry: Registry,
    resolver: Arc<RepoResolver>,
    host: Arc<dyn ExtensionHost>,
    official: Arc<dyn OfficialFeedSource>,
    releases: Arc<dyn ReleaseSource>,
    events: EventBus,
    statuses: Mutex<BTreeMap<String, VersionStatus>>,
}

impl UpdateChecker {
    pub fn new(
        registry: Registry,
        resolver: Arc<RepoResolver>,
        host: Arc<dyn ExtensionHost>,
        official: Arc<dyn OfficialFeedSource>,
        releases: Arc<dyn ReleaseSource>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            resolver,
            host,
            official,
            releases,
            events,
            statuses: Mutex::new(BTreeMap::new()),
        }
    }

    /// Statuses retained from the most recent checks.
    pub async fn statuses(&self) -> BTreeMap<String, VersionStatus> {
        self.statuses.lock().await.clone()
    }

    pub async fn status(&self, id: &str) -> Option<VersionStatus> {
        self.statuses.lock().await.get(id).cloned()
    }

    /// Check every tracked extension except the engine's own.
    ///
    /// `progress` fires after each extension. Cancellation is polled between
    /// extensions; whatever was computed before it is kept and returned.
    pub async fn check_all(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, VersionStatus> {
        let official = self.fetch_official().await;
        let locals = self.local_versions().await;
        let self_id = self.host.self_id().to_string();
        let ids: Vec<String> = self
            .registry
            .ids()
            .await
            .into_iter()
            .filter(|id| *id != self_id)
            .collect();

        let mut results = BTreeMap::new();
        for id in ids {
            if cancel.is_requested() {
                info!("Update check cancelled after {} extensions", results.len());
                break;
            }
            let local = locals.get(&id).cloned().unwrap_or_default();
            let status = self.check_with(&id, local, &official).await;
            self.statuses.lock().await.insert(id.clone(), status.clone());
            self.events.emit(SyncEvent::StatusUpdated { id: id.clone() });
            results.insert(id.clone(), status);
            progress.advance(&id);
        }
        results
    }

    /// Recheck one extension and replace only its retained status.
    pub async fn check_one(&self, id: &str) -> Result<VersionStatus> {
        let official = self.fetch_official().await;
        let local = self.host.installed_version(id).await?.unwrap_or_default();
        let status = self.check_with(id, local, &official).await;
        self.statuses
            .lock()
            .await
            .insert(id.to_string(), status.clone());
        self.events.emit(SyncEvent::StatusUpdated { id: id.to_string() });
        Ok(status)
    }

    async fn fetch_official(&self) -> BTreeMap<String, String> {
        match self.official.fetch_official_versions().await {
            Ok(versions) => versions,
            Err(e) => {
                warn!("Failed to fetch official version feed: {}", e);
                BTreeMap::new()
            }
        }
    }

    async fn local_versions(&self) -> BTreeMap<String, String> {
        match self.host.list_extensions().await {
            Ok(list) => list.into_iter().map(|e| (e.id, e.version)).collect(),
            Err(e) => {
                warn!("Failed to read installed versions: {}", e);
                BTreeMap::new()
            }
        }
    }

    async fn check_with(
        &self,
        id: &str,
        local: String,
        official: &BTreeMap<String, String>,
    ) -> VersionStatus {
        if let Some(remote) = official.get(id) {
            let mut status = VersionStatus::new(VersionSource::Official, local);
            status.set_remote(remote.clone());
            if let Some(repo) = self.resolver.resolve(id).await {
                match self.releases.list_releases(&repo).await {
                    Ok(releases) => status.available_versions = release_versions(&releases),
                    Err(e) => debug!("No release list for {} ({}): {}", id, repo, e),
                }
                status.repository = Some(repo);
            }
            return status;
        }

        let Some(repo) = self.resolver.resolve(id).await else {
            return VersionStatus::new(VersionSource::Unresolved, local);
        };
        let mut status = VersionStatus::new(VersionSource::Repository, local);
        status.repository = Some(repo.clone());

        match self.releases.list_releases(&repo).await {
            Ok(releases) => {
                status.available_versions = release_versions(&releases);
                if let Some(candidate) = pick_candidate(&releases) {
                    status.set_remote(candidate.tag_name.clone());
                    return status;
                }
            }
            Err(e) => {
                warn!("Failed to list releases of {}: {}", repo, e);
                status.error = Some(e.to_string());
                return status;
            }
        }

        match self.manifest_version(&repo).await {
            Ok(Some(version)) => status.set_remote(version),
            Ok(None) => status.error = Some("manifest has no version".to_string()),
            Err(e) => {
                warn!("Failed to read manifest of {}: {}", repo, e);
                status.error = Some(e.to_string());
            }
        }
        status
    }

    async fn manifest_version(&self, repo: &str) -> Result<Option<String>> {
        let raw = self
            .releases
            .read_raw_file(repo, NetworkConfig::DEFAULT_BRANCH_REF, AssetConfig::MANIFEST)
            .await?;
        let manifest: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(manifest
            .get("version")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, prerelease: bool) -> GitHubRelease {
        GitHubRelease {
            tag_name: tag.into(),
            name: None,
            prerelease,
            draft: false,
            assets: vec![],
        }
    }

    #[test]
    fn test_pick_candidate_prefers_first_stable() {
        let releases = vec![release("2.0.0-beta", true), release("1.2.0", false), release("1.1.0", false)];
        assert_eq!(pick_candidate(&releases).unwrap().tag_name, "1.2.0");
    }

    #[test]
    fn test_pick_candidate_falls_back_to_prerelease() {
        let releases = vec![release("0.2.0-rc", true), release("0.1.0-rc", true)];
        assert_eq!(pick_candidate(&releases).unwrap().tag_name, "0.2.0-rc");
        assert!(pick_candidate(&[]).is_none());
    }

    #[test]
    fn test_set_remote_computes_has_update() {
        let mut status = VersionStatus::new(VersionSource::Repository, "1.0.0".into());
        status.set_remote("1.0".into());
        assert_eq!(status.has_update, Some(false));
        status.set_remote("1.10.0".into());
        assert_eq!(status.has_update, Some(true));
    }
}
