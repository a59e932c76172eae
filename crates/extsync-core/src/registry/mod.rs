//! Canonical store of extension records, groups, tags and delay profiles.
//!
//! The registry is an explicit service with a `load()`/`save()` lifecycle
//! and is handed to every other component. All mutation goes through
//! [`Registry::update`], which works on a copy and swaps it in only when the
//! closure succeeds, so readers never observe a half-applied change.
//! Persisting is a separate step: a failed save leaves memory ahead of disk
//! and the error goes back to the caller.

mod types;

pub use types::{DelayProfile, ExtensionRecord, Group, RegistryState, Settings, Tag};

use crate::persist::{atomic_read_json, atomic_write_json};
use crate::{Result, SyncError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Shared handle to the registry. Clones refer to the same state.
#[derive(Clone)]
pub struct Registry {
    path: PathBuf,
    state: Arc<RwLock<RegistryState>>,
}

impl Registry {
    /// Load the registry from `path`. A missing file yields an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state: RegistryState = atomic_read_json(&path)?.unwrap_or_default();
        info!(
            "Loaded registry with {} extensions from {}",
            state.extensions.len(),
            path.display()
        );
        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create a registry around existing state without reading disk.
    pub fn with_state(path: impl Into<PathBuf>, state: RegistryState) -> Self {
        Self {
            path: path.into(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current state verbatim.
    pub async fn save(&self) -> Result<()> {
        let state = self.state.read().await;
        atomic_write_json(&self.path, &*state, true)?;
        debug!("Saved registry ({} extensions)", state.extensions.len());
        Ok(())
    }

    /// Copy of the full state.
    pub async fn snapshot(&self) -> RegistryState {
        self.state.read().await.clone()
    }

    /// Replace the whole state in one step.
    pub async fn replace(&self, state: RegistryState) {
        *self.state.write().await = state;
    }

    /// Apply `f` to a working copy and commit it only if `f` succeeds.
    pub async fn update<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut RegistryState) -> Result<R>,
    {
        let mut guard = self.state.write().await;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        *guard = working;
        Ok(out)
    }

    pub async fn get(&self, id: &str) -> Option<ExtensionRecord> {
        self.state.read().await.extension(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.extension(id).is_some()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .extensions
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    pub async fn settings(&self) -> Settings {
        self.state.read().await.settings.clone()
    }

    /// Insert a new record. Fails on an empty or already registered id.
    pub async fn insert(&self, record: ExtensionRecord) -> Result<()> {
        self.update(|state| {
            if record.id.trim().is_empty() {
                return Err(SyncError::Validation {
                    field: "id".into(),
                    message: "extension id must not be empty".into(),
                });
            }
            if state.extension(&record.id).is_some() {
                return Err(SyncError::DuplicateExtension { id: record.id });
            }
            state.extensions.push(record);
            Ok(())
        })
        .await
    }

    /// Remove a record, returning it if it existed.
    pub async fn remove(&self, id: &str) -> Option<ExtensionRecord> {
        let mut state = self.state.write().await;
        let index = state.extensions.iter().position(|r| r.id == id)?;
        Some(state.extensions.remove(index))
    }

    /// Whether `id` was installed through this tool, by settings or tag.
    pub async fn is_installed_by_tool(&self, id: &str) -> bool {
        let state = self.state.read().await;
        state.settings.installed_by_tool.contains(id)
            || state.extension(id).is_some_and(|r| r.is_tool_installed())
    }

    /// Record that `id` was installed through this tool.
    pub async fn mark_installed_by_tool(&self, id: &str) {
        let mut state = self.state.write().await;
        state.settings.installed_by_tool.insert(id.to_string());
    }

    // Tags

    pub async fn add_tag(&self, tag: Tag) -> Result<()> {
        self.update(|state| {
            if tag.id.trim().is_empty() {
                return Err(SyncError::Validation {
                    field: "tag.id".into(),
                    message: "tag id must not be empty".into(),
                });
            }
            if state.has_tag(&tag.id) {
                return Err(SyncError::Validation {
                    field: "tag.id".into(),
                    message: format!("tag {} already exists", tag.id),
                });
            }
            state.tags.push(tag);
            Ok(())
        })
        .await
    }

    /// Delete a tag. Refused while any record still references it.
    pub async fn remove_tag(&self, id: &str) -> Result<()> {
        self.update(|state| {
            let index = state
                .tags
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| SyncError::UnknownTag { id: id.to_string() })?;
            if state.extensions.iter().any(|r| r.tag_ids.contains(id)) {
                return Err(SyncError::TagInUse { id: id.to_string() });
            }
            state.tags.remove(index);
            Ok(())
        })
        .await
    }

    /// Replace the tag set of a record. Every tag must exist.
    pub async fn assign_tags(&self, id: &str, tag_ids: BTreeSet<String>) -> Result<()> {
        self.update(|state| {
            if let Some(missing) = tag_ids.iter().find(|t| !state.has_tag(t)) {
                return Err(SyncError::UnknownTag {
                    id: missing.clone(),
                });
            }
            let record = state
                .extension_mut(id)
                .ok_or_else(|| SyncError::UnknownExtension { id: id.to_string() })?;
            record.tag_ids = tag_ids;
            Ok(())
        })
        .await
    }

    // Groups and delay profiles

    pub async fn add_group(&self, group: Group) -> Result<()> {
        self.update(|state| {
            if state.groups.iter().any(|g| g.id == group.id) {
                return Err(SyncError::Validation {
                    field: "group.id".into(),
                    message: format!("group {} already exists", group.id),
                });
            }
            state.groups.push(group);
            Ok(())
        })
        .await
    }

    pub async fn set_group(&self, id: &str, group_id: Option<String>) -> Result<()> {
        self.update(|state| {
            if let Some(group) = &group_id {
                if !state.groups.iter().any(|g| &g.id == group) {
                    return Err(SyncError::Validation {
                        field: "groupId".into(),
                        message: format!("unknown group {}", group),
                    });
                }
            }
            let record = state
                .extension_mut(id)
                .ok_or_else(|| SyncError::UnknownExtension { id: id.to_string() })?;
            record.group_id = group_id;
            Ok(())
        })
        .await
    }

    pub async fn add_delay_profile(&self, profile: DelayProfile) -> Result<()> {
        self.update(|state| {
            if state.delays.iter().any(|d| d.id == profile.id) {
                return Err(SyncError::Validation {
                    field: "delay.id".into(),
                    message: format!("delay profile {} already exists", profile.id),
                });
            }
            state.delays.push(profile);
            Ok(())
        })
        .await
    }

    pub async fn set_delay(&self, id: &str, delay_id: Option<String>) -> Result<()> {
        self.update(|state| {
            if let Some(delay) = &delay_id {
                if !state.delays.iter().any(|d| &d.id == delay) {
                    return Err(SyncError::Validation {
                        field: "delayProfileId".into(),
                        message: format!("unknown delay profile {}", delay),
                    });
                }
            }
            let record = state
                .extension_mut(id)
                .ok_or_else(|| SyncError::UnknownExtension { id: id.to_string() })?;
            record.delay_profile_id = delay_id;
            Ok(())
        })
        .await
    }

    pub async fn set_hidden(&self, id: &str, hidden: bool) {
        let mut state = self.state.write().await;
        if hidden {
            state.settings.hidden.insert(id.to_string());
        } else {
            state.settings.hidden.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::TempDir;

    fn record(id: &str) -> ExtensionRecord {
        ExtensionRecord::from_host(id, id.to_uppercase(), "", true)
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("registry.json")).unwrap();
        assert!(registry.ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        let registry = Registry::load(&path).unwrap();
        registry.insert(record("alpha")).await.unwrap();
        registry
            .update(|s| {
                s.settings
                    .repo_overrides
                    .insert("alpha".into(), "acme/alpha".into());
                Ok(())
            })
            .await
            .unwrap();
        registry.save().await.unwrap();

        let reloaded = Registry::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().await, registry.snapshot().await);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_empty_ids() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        registry.insert(record("alpha")).await.unwrap();
        assert!(matches!(
            registry.insert(record("alpha")).await,
            Err(SyncError::DuplicateExtension { .. })
        ));
        assert!(matches!(
            registry.insert(record(" ")).await,
            Err(SyncError::Validation { .. })
        ));
        assert_eq!(registry.ids().await, vec!["alpha"]);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_state_untouched() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        registry.insert(record("alpha")).await.unwrap();

        let result: Result<()> = registry
            .update(|s| {
                s.extensions.clear();
                Err(SyncError::Cancelled)
            })
            .await;

        assert!(result.is_err());
        assert!(registry.contains("alpha").await);
    }

    #[tokio::test]
    async fn test_tag_lifecycle() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        registry.insert(record("alpha")).await.unwrap();
        registry
            .add_tag(Tag {
                id: "fav".into(),
                name: "Favorite".into(),
                color: String::new(),
            })
            .await
            .unwrap();

        let unknown: BTreeSet<String> = ["nope".to_string()].into();
        assert!(matches!(
            registry.assign_tags("alpha", unknown).await,
            Err(SyncError::UnknownTag { .. })
        ));

        let fav: BTreeSet<String> = ["fav".to_string()].into();
        registry.assign_tags("alpha", fav).await.unwrap();
        assert!(matches!(
            registry.remove_tag("fav").await,
            Err(SyncError::TagInUse { .. })
        ));

        registry.assign_tags("alpha", BTreeSet::new()).await.unwrap();
        registry.remove_tag("fav").await.unwrap();
        assert!(matches!(
            registry.remove_tag("fav").await,
            Err(SyncError::UnknownTag { .. })
        ));
    }

    #[tokio::test]
    async fn test_group_and_delay_are_validated() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        registry.insert(record("alpha")).await.unwrap();

        assert!(registry.set_group("alpha", Some("work".into())).await.is_err());
        registry
            .add_group(Group {
                id: "work".into(),
                name: "Work".into(),
                color: String::new(),
            })
            .await
            .unwrap();
        registry.set_group("alpha", Some("work".into())).await.unwrap();

        registry
            .add_delay_profile(DelayProfile {
                id: "slow".into(),
                name: "Slow".into(),
                seconds: 10,
            })
            .await
            .unwrap();
        registry.set_delay("alpha", Some("slow".into())).await.unwrap();

        let got = registry.get("alpha").await.unwrap();
        assert_eq!(got.group_id.as_deref(), Some("work"));
        assert_eq!(got.delay_profile_id.as_deref(), Some("slow"));
        assert!(matches!(
            registry.set_group("ghost", None).await,
            Err(SyncError::UnknownExtension { .. })
        ));
    }

    #[tokio::test]
    async fn test_installed_by_tool_via_settings_or_tag() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        let mut tagged = record("tagged");
        tagged.tag_ids.insert(AppConfig::INSTALLED_TAG_ID.to_string());
        registry.insert(tagged).await.unwrap();
        registry.insert(record("plain")).await.unwrap();

        assert!(registry.is_installed_by_tool("tagged").await);
        assert!(!registry.is_installed_by_tool("plain").await);
        registry.mark_installed_by_tool("plain").await;
        assert!(registry.is_installed_by_tool("plain").await);
    }

    #[tokio::test]
    async fn test_hidden_toggle() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        registry.set_hidden("alpha", true).await;
        assert!(registry.settings().await.hidden.contains("alpha"));
        registry.set_hidden("alpha", false).await;
        assert!(registry.settings().await.hidden.is_empty());
    }
}
