//! Install extensions and themes from repository releases.
//!
//! Release assets are preferred. When the release is missing, or lacks an
//! asset, the same file is read straight from the repository at the release
//! tag (or the default branch when no tag is known).

use crate::config::{AppConfig, AssetConfig, NetworkConfig};
use crate::events::{EventBus, SyncEvent};
use crate::host::{is_safe_dir_name, ExtensionBundle, ExtensionHost, ThemeBundle};
use crate::mirror::NoteMirror;
use crate::network::{GitHubRelease, ReleaseSource};
use crate::reconcile::reconcile;
use crate::registry::Registry;
use crate::repo_id::normalize_repository;
use crate::resolver::RepoResolver;
use crate::updates::{ReleaseVersion, UpdateChecker};
use crate::{Result, SyncError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

impl ReleaseManifest {
    fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::Json {
            message: format!("Failed to parse {}: {}", AssetConfig::MANIFEST, e),
            source: Some(e),
        })
    }

    fn require(&self, field: &str) -> Result<()> {
        let value = match field {
            "id" => &self.id,
            "name" => &self.name,
            _ => &self.version,
        };
        if value.trim().is_empty() {
            return Err(SyncError::InvalidManifest {
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// Like [`Self::require`], and the value must also be usable as a
    /// directory name on the host.
    fn require_dir_name(&self, field: &str) -> Result<()> {
        self.require(field)?;
        let value = if field == "id" { &self.id } else { &self.name };
        if !is_safe_dir_name(value) {
            return Err(SyncError::InvalidManifest {
                field: field.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub id: String,
    pub version: String,
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeInstallReport {
    pub name: String,
    pub version: String,
    pub repository: String,
}

pub struct Installer {
    registry: Registry,
    resolver: Arc<RepoResolver>,
    host: Arc<dyn ExtensionHost>,
    releases: Arc<dyn ReleaseSource>,
    checker: Arc<UpdateChecker>,
    mirror: Option<Arc<NoteMirror>>,
    events: EventBus,
}

impl Installer {
    pub fn new(
        registry: Registry,
        resolver: Arc<RepoResolver>,
        host: Arc<dyn ExtensionHost>,
        releases: Arc<dyn ReleaseSource>,
        checker: Arc<UpdateChecker>,
        mirror: Option<Arc<NoteMirror>>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            resolver,
            host,
            releases,
            checker,
            mirror,
            events,
        }
    }

    /// Tag names of `repo` with their prerelease flags, in API order.
    pub async fn list_release_versions(&self, repo: &str) -> Result<Vec<ReleaseVersion>> {
        let repo = normalize_repository(repo)?;
        let releases = self.releases.list_releases(&repo).await?;
        Ok(releases
            .into_iter()
            .map(|r| ReleaseVersion {
                version: r.tag_name,
                prerelease: r.prerelease,
            })
            .collect())
    }

    /// Install or update an extension from `repo`, at `tag` or the latest release.
    pub async fn install_extension(&self, repo: &str, tag: Option<&str>) -> Result<InstallReport> {
        let repo = normalize_repository(repo)?;
        let release = self.find_release(&repo, tag).await?;
        let git_ref = git_ref_for(release.as_ref(), tag);

        let manifest_raw = self
            .fetch_file(&repo, release.as_ref(), &git_ref, AssetConfig::MANIFEST)
            .await?
            .ok_or_else(|| SyncError::MissingAsset {
                asset: AssetConfig::MANIFEST.to_string(),
            })?;
        let manifest = ReleaseManifest::parse(&manifest_raw)?;
        manifest.require_dir_name("id")?;
        manifest.require("name")?;

        let main = self
            .fetch_file(&repo, release.as_ref(), &git_ref, AssetConfig::MAIN_BUNDLE)
            .await?
            .ok_or_else(|| SyncError::MissingAsset {
                asset: AssetConfig::MAIN_BUNDLE.to_string(),
            })?;
        let styles = self
            .fetch_file(&repo, release.as_ref(), &git_ref, AssetConfig::STYLESHEET)
            .await?;

        let id = manifest.id.clone();
        self.host
            .write_extension(&ExtensionBundle {
                id: id.clone(),
                manifest: manifest_raw,
                main,
                styles,
            })
            .await?;
        self.host.reload_manifests().await?;
        if let Err(e) = self.host.disable(&id).await {
            debug!("Disable before enable of {} failed: {}", id, e);
        }
        if let Err(e) = self.host.enable(&id).await {
            warn!("Failed to enable {} after install: {}", id, e);
        }

        self.registry
            .update(|state| {
                state.settings.installed_by_tool.insert(id.clone());
                Ok(())
            })
            .await?;
        self.resolver.set_repo(&id, &repo).await?;
        reconcile(&self.registry, self.host.as_ref()).await?;
        self.sync_enabled_flag(&id).await?;

        if let Some(mirror) = &self.mirror {
            mirror.export_one(&id).await?;
        }
        if let Err(e) = self.checker.check_one(&id).await {
            warn!("Failed to refresh update status of {}: {}", id, e);
        }
        self.events.emit(SyncEvent::RegistryChanged);

        info!("Installed {} {} from {}", id, manifest.version, repo);
        Ok(InstallReport {
            id,
            version: manifest.version,
            repository: repo,
        })
    }

    /// Install a theme from `repo`.
    pub async fn install_theme(&self, repo: &str, tag: Option<&str>) -> Result<ThemeInstallReport> {
        let repo = normalize_repository(repo)?;
        let release = self.find_release(&repo, tag).await?;
        let git_ref = git_ref_for(release.as_ref(), tag);

        let manifest_raw = self
            .fetch_file(&repo, release.as_ref(), &git_ref, AssetConfig::MANIFEST)
            .await?
            .ok_or_else(|| SyncError::MissingAsset {
                asset: AssetConfig::MANIFEST.to_string(),
            })?;
        let manifest = ReleaseManifest::parse(&manifest_raw)?;
        manifest.require_dir_name("name")?;

        let mut stylesheet = None;
        for candidate in AssetConfig::THEME_STYLESHEETS {
            if let Some(css) = self
                .fetch_file(&repo, release.as_ref(), &git_ref, candidate)
                .await?
            {
                stylesheet = Some(css);
                break;
            }
        }
        let stylesheet = stylesheet.ok_or_else(|| SyncError::MissingAsset {
            asset: AssetConfig::THEME_STYLESHEETS[0].to_string(),
        })?;

        self.host
            .write_theme(&ThemeBundle {
                name: manifest.name.clone(),
                manifest: manifest_raw,
                stylesheet,
            })
            .await?;

        info!("Installed theme {} from {}", manifest.name, repo);
        Ok(ThemeInstallReport {
            name: manifest.name,
            version: manifest.version,
            repository: repo,
        })
    }

    /// Remove an extension from the host and from every view of it.
    pub async fn uninstall(&self, id: &str) -> Result<()> {
        if id == self.host.self_id() {
            return Err(SyncError::Validation {
                field: "id".into(),
                message: format!("{} cannot uninstall itself", AppConfig::APP_NAME),
            });
        }
        self.host.uninstall(id).await?;
        self.host.reload_manifests().await?;
        self.registry
            .update(|state| {
                state.settings.installed_by_tool.remove(id);
                Ok(())
            })
            .await?;
        reconcile(&self.registry, self.host.as_ref()).await?;
        if let Some(mirror) = &self.mirror {
            mirror.export_all().await?;
        }
        self.events.emit(SyncEvent::RegistryChanged);
        info!("Uninstalled {}", id);
        Ok(())
    }

    async fn find_release(&self, repo: &str, tag: Option<&str>) -> Result<Option<GitHubRelease>> {
        let release = match tag {
            Some(tag) => self.releases.release_by_tag(repo, tag).await?,
            None => self.releases.latest_release(repo).await?,
        };
        if release.is_none() {
            debug!("No release found for {}, falling back to raw files", repo);
        }
        Ok(release)
    }

    /// Asset text from the release, or the raw repository file. `None` when
    /// neither exists.
    async fn fetch_file(
        &self,
        repo: &str,
        release: Option<&GitHubRelease>,
        git_ref: &str,
        name: &str,
    ) -> Result<Option<String>> {
        if let Some(asset) = release.and_then(|r| r.asset(name)) {
            return self.releases.fetch_asset(asset).await.map(Some);
        }
        match self.releases.read_raw_file(repo, git_ref, name).await {
            Ok(text) => Ok(Some(text)),
            Err(SyncError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sync_enabled_flag(&self, id: &str) -> Result<()> {
        let enabled = match self.host.enabled_ids().await {
            Ok(set) => set.contains(id),
            Err(e) => {
                warn!("Failed to read run state of {}: {}", id, e);
                return Ok(());
            }
        };
        self.registry
            .update(|state| {
                if let Some(record) = state.extension_mut(id) {
                    record.enabled = enabled;
                }
                Ok(())
            })
            .await?;
        self.registry.save().await
    }
}

fn git_ref_for(release: Option<&GitHubRelease>, tag: Option<&str>) -> String {
    release
        .map(|r| r.tag_name.clone())
        .or_else(|| tag.map(str::to_string))
        .unwrap_or_else(|| NetworkConfig::DEFAULT_BRANCH_REF.to_string())
}
