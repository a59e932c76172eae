//! Extension management methods on ExtSync.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::warn;

use crate::cancel::{CancellationToken, ProgressSink};
use crate::error::Result;
use crate::events::SyncEvent;
use crate::install::{InstallReport, ThemeInstallReport};
use crate::mirror::ImportOutcome;
use crate::updates::{ReleaseVersion, VersionStatus};
use crate::ExtSync;

impl ExtSync {
    // ========================================
    // Update checks
    // ========================================

    pub async fn check_all(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, VersionStatus> {
        self.state.checker.check_all(progress, cancel).await
    }

    pub async fn check_one(&self, id: &str) -> Result<VersionStatus> {
        self.state.checker.check_one(id).await
    }

    /// Statuses retained from earlier checks.
    pub async fn statuses(&self) -> BTreeMap<String, VersionStatus> {
        self.state.checker.statuses().await
    }

    // ========================================
    // Install / uninstall
    // ========================================

    pub async fn install_extension(&self, repo: &str, tag: Option<&str>) -> Result<InstallReport> {
        self.state.installer.install_extension(repo, tag).await
    }

    pub async fn install_theme(&self, repo: &str, tag: Option<&str>) -> Result<ThemeInstallReport> {
        self.state.installer.install_theme(repo, tag).await
    }

    pub async fn uninstall(&self, id: &str) -> Result<()> {
        self.state.installer.uninstall(id).await
    }

    pub async fn list_release_versions(&self, repo: &str) -> Result<Vec<ReleaseVersion>> {
        self.state.installer.list_release_versions(repo).await
    }

    // ========================================
    // Repository mapping
    // ========================================

    pub async fn resolve_repo(&self, id: &str) -> Option<String> {
        self.state.resolver.resolve(id).await
    }

    /// Set the repository of `id` and refresh its mirror document.
    pub async fn set_repo(&self, id: &str, repo: &str) -> Result<String> {
        let repo = self.state.resolver.set_repo(id, repo).await?;
        self.record_changed(id).await?;
        Ok(repo)
    }

    pub async fn refresh_community_index(&self) -> Result<usize> {
        self.state.resolver.refresh_index().await
    }

    // ========================================
    // Organization
    // ========================================

    pub async fn assign_tags(&self, id: &str, tag_ids: BTreeSet<String>) -> Result<()> {
        self.state.registry.assign_tags(id, tag_ids).await?;
        self.record_changed(id).await
    }

    pub async fn set_group(&self, id: &str, group_id: Option<String>) -> Result<()> {
        self.state.registry.set_group(id, group_id).await?;
        self.record_changed(id).await
    }

    pub async fn set_delay(&self, id: &str, delay_id: Option<String>) -> Result<()> {
        self.state.registry.set_delay(id, delay_id).await?;
        self.record_changed(id).await
    }

    pub async fn set_hidden(&self, id: &str, hidden: bool) -> Result<()> {
        self.state.registry.set_hidden(id, hidden).await;
        self.state.registry.save().await?;
        self.state.events.emit(SyncEvent::RegistryChanged);
        Ok(())
    }

    // ========================================
    // Mirror
    // ========================================

    /// Import one document by hand, as the watcher would.
    pub async fn import_document(&self, path: &Path) -> Result<Option<ImportOutcome>> {
        match &self.state.mirror {
            Some(mirror) => mirror.handle_document_changed(path).await.map(Some),
            None => Ok(None),
        }
    }

    /// Re-export every document. Zero when mirroring is disabled.
    pub async fn export_all(&self) -> Result<usize> {
        match &self.state.mirror {
            Some(mirror) => mirror.export_all().await,
            None => Ok(0),
        }
    }

    /// Persist, re-export the record's document and notify subscribers.
    async fn record_changed(&self, id: &str) -> Result<()> {
        self.state.registry.save().await?;
        if let Some(mirror) = &self.state.mirror {
            if self.state.registry.contains(id).await {
                if let Err(e) = mirror.export_one(id).await {
                    warn!("Failed to refresh mirror document of {}: {}", id, e);
                }
            }
        }
        self.state.events.emit(SyncEvent::RegistryChanged);
        Ok(())
    }
}
