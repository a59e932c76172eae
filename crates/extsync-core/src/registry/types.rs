//! Persisted registry entities.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::AppConfig;

/// One installed extension as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub delay_profile_id: Option<String>,
    #[serde(default)]
    pub user_note: String,
}

impl ExtensionRecord {
    /// Seed a record from host metadata with no user-assigned data.
    pub fn from_host(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
            group_id: None,
            tag_ids: BTreeSet::new(),
            enabled,
            delay_profile_id: None,
            user_note: String::new(),
        }
    }

    /// Whether the record carries the system "installed by this tool" tag.
    pub fn is_tool_installed(&self) -> bool {
        self.tag_ids.contains(AppConfig::INSTALLED_TAG_ID)
    }
}

/// A user-defined grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// A label that can be attached to many extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

impl Tag {
    /// The well-known tag marking extensions installed by this tool.
    pub fn installed_by_tool() -> Self {
        Self {
            id: AppConfig::INSTALLED_TAG_ID.to_string(),
            name: AppConfig::INSTALLED_TAG_NAME.to_string(),
            color: AppConfig::INSTALLED_TAG_COLOR.to_string(),
        }
    }
}

/// A startup delay applied to extensions when delayed startup is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayProfile {
    pub id: String,
    pub name: String,
    /// Delay in seconds.
    pub seconds: u64,
}

/// User settings persisted alongside the records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Explicit `extension id -> owner/name` overrides. Highest precedence.
    #[serde(default)]
    pub repo_overrides: BTreeMap<String, String>,
    /// Ids of extensions installed through this tool.
    #[serde(default)]
    pub installed_by_tool: BTreeSet<String>,
    /// Mirror directory relative to the host root. Empty disables mirroring.
    #[serde(default)]
    pub mirror_dir: String,
    #[serde(default)]
    pub github_token: String,
    #[serde(default)]
    pub hidden: BTreeSet<String>,
    #[serde(default)]
    pub delayed_startup: bool,
}

impl Settings {
    /// The configured token, if any non-blank one is set.
    pub fn token(&self) -> Option<&str> {
        let token = self.github_token.trim();
        (!token.is_empty()).then_some(token)
    }
}

/// Everything the registry persists, stored verbatim as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryState {
    #[serde(default)]
    pub extensions: Vec<ExtensionRecord>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub delays: Vec<DelayProfile>,
    #[serde(default)]
    pub settings: Settings,
    /// Last schema version the migration runner brought this state to.
    #[serde(default)]
    pub migration_version: Option<String>,
}

impl RegistryState {
    pub fn extension(&self, id: &str) -> Option<&ExtensionRecord> {
        self.extensions.iter().find(|r| r.id == id)
    }

    pub fn extension_mut(&mut self, id: &str) -> Option<&mut ExtensionRecord> {
        self.extensions.iter_mut().find(|r| r.id == id)
    }

    pub fn has_tag(&self, id: &str) -> bool {
        self.tags.iter().any(|t| t.id == id)
    }

    /// Add the system tag if it is missing. Returns true when it was added.
    pub fn ensure_installed_tag(&mut self) -> bool {
        if self.has_tag(AppConfig::INSTALLED_TAG_ID) {
            return false;
        }
        self.tags.push(Tag::installed_by_tool());
        true
    }

    /// Drop tag references that point at tags no longer defined.
    /// Returns the number of references removed.
    pub fn prune_dangling_tags(&mut self) -> usize {
        let known: BTreeSet<String> = self.tags.iter().map(|t| t.id.clone()).collect();
        let mut removed = 0;
        for record in &mut self.extensions {
            let before = record.tag_ids.len();
            record.tag_ids.retain(|t| known.contains(t));
            removed += before - record.tag_ids.len();
        }
        removed
    }
}
