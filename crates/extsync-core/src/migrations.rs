//! Versioned upgrades of the persisted registry.
//!
//! Every step is idempotent. Pending steps (target above the stored
//! version) run in ascending order and the stored version is persisted after
//! each one, so an interrupted run resumes where it stopped.

use crate::config::AppConfig;
use crate::registry::{Registry, RegistryState};
use crate::repo_id::normalize_repository;
use crate::version::compare_versions;
use crate::Result;
use std::cmp::Ordering;
use tracing::{info, warn};

/// One upgrade step. `apply` returns whether it changed anything.
pub struct Migration {
    pub target_version: &'static str,
    pub apply: fn(&mut RegistryState) -> bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub changed: bool,
    pub final_version: String,
}

/// Placeholder ids older releases seeded into every registry.
const PLACEHOLDER_ID: &str = "default";

fn drop_placeholders(state: &mut RegistryState) -> bool {
    let mut changed = false;
    let groups = state.groups.len();
    state.groups.retain(|g| g.id != PLACEHOLDER_ID);
    changed |= groups != state.groups.len();

    let tags = state.tags.len();
    state.tags.retain(|t| t.id != PLACEHOLDER_ID);
    changed |= tags != state.tags.len();

    for record in &mut state.extensions {
        if record.group_id.as_deref() == Some(PLACEHOLDER_ID) {
            record.group_id = None;
            changed = true;
        }
        changed |= record.tag_ids.remove(PLACEHOLDER_ID);
        if record.display_name.trim().is_empty() {
            record.display_name = record.id.clone();
            changed = true;
        }
    }

    changed |= state.ensure_installed_tag();
    changed
}

fn normalize_overrides(state: &mut RegistryState) -> bool {
    let mut changed = false;
    let overrides = std::mem::take(&mut state.settings.repo_overrides);
    for (id, repo) in overrides {
        match normalize_repository(&repo) {
            Ok(normalized) => {
                changed |= normalized != repo;
                state.settings.repo_overrides.insert(id, normalized);
            }
            Err(_) => {
                warn!("Dropping unusable repository override {} -> {:?}", id, repo);
                changed = true;
            }
        }
    }
    changed |= state.prune_dangling_tags() > 0;
    changed
}

/// Steps in ascending target order.
pub fn default_migrations() -> Vec<Migration> {
    vec![
        Migration {
            target_version: "0.3.1",
            apply: drop_placeholders,
        },
        Migration {
            target_version: "0.4.0",
            apply: normalize_overrides,
        },
    ]
}

pub struct MigrationRunner {
    steps: Vec<Migration>,
    current_version: String,
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self::with_steps(default_migrations(), AppConfig::VERSION)
    }

    pub fn with_steps(mut steps: Vec<Migration>, current_version: impl Into<String>) -> Self {
        steps.sort_by(|a, b| compare_versions(a.target_version, b.target_version));
        Self {
            steps,
            current_version: current_version.into(),
        }
    }

    pub async fn run(&self, registry: &Registry) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let mut stored = registry
            .snapshot()
            .await
            .migration_version
            .unwrap_or_else(|| "0".to_string());

        for step in &self.steps {
            if compare_versions(step.target_version, &stored) != Ordering::Greater {
                continue;
            }
            let changed = registry
                .update(|state| {
                    let changed = (step.apply)(state);
                    state.migration_version = Some(step.target_version.to_string());
                    Ok(changed)
                })
                .await?;
            registry.save().await?;
            info!(
                "Applied migration {} ({})",
                step.target_version,
                if changed { "changed" } else { "no changes" }
            );
            report.applied.push(step.target_version.to_string());
            report.changed |= changed;
            stored = step.target_version.to_string();
        }

        if compare_versions(&self.current_version, &stored) == Ordering::Greater {
            let target = self.current_version.clone();
            registry
                .update(|state| {
                    state.migration_version = Some(target.clone());
                    Ok(())
                })
                .await?;
            registry.save().await?;
            stored = target;
        }

        report.final_version = stored;
        Ok(report)
    }
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ExtensionRecord, Group, Tag};
    use tempfile::TempDir;

    fn legacy_state() -> RegistryState {
        let mut state = RegistryState::default();
        state.groups.push(Group {
            id: "default".into(),
            name: "Default".into(),
            color: String::new(),
        });
        state.tags.push(Tag {
            id: "default".into(),
            name: "Default".into(),
            color: String::new(),
        });
        let mut record = ExtensionRecord::from_host("alpha", "", "", true);
        record.group_id = Some("default".into());
        record.tag_ids.insert("default".into());
        record.tag_ids.insert("ghost".into());
        state.extensions.push(record);
        state
            .settings
            .repo_overrides
            .insert("alpha".into(), "https://github.com/acme/alpha.git".into());
        state
            .settings
            .repo_overrides
            .insert("broken".into(), "nope".into());
        state
    }

    #[tokio::test]
    async fn test_steps_upgrade_legacy_state() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::with_state(temp.path().join("r.json"), legacy_state());

        let report = MigrationRunner::with_steps(default_migrations(), "0.4.2")
            .run(&registry)
            .await
            .unwrap();
        assert_eq!(report.applied, vec!["0.3.1", "0.4.0"]);
        assert_eq!(report.final_version, "0.4.2");

        let state = registry.snapshot().await;
        let record = state.extension("alpha").unwrap();
        assert_eq!(record.display_name, "alpha");
        assert!(record.group_id.is_none());
        assert!(record.tag_ids.is_empty());
        assert!(state.has_tag(AppConfig::INSTALLED_TAG_ID));
        assert!(!state.has_tag("default"));
        assert_eq!(
            state.settings.repo_overrides.get("alpha").map(String::as_str),
            Some("acme/alpha")
        );
        assert!(!state.settings.repo_overrides.contains_key("broken"));
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::with_state(temp.path().join("r.json"), legacy_state());
        let runner = MigrationRunner::new();

        runner.run(&registry).await.unwrap();
        let after_first = registry.snapshot().await;
        let second = runner.run(&registry).await.unwrap();

        assert!(second.applied.is_empty());
        assert!(!second.changed);
        assert_eq!(registry.snapshot().await, after_first);
    }

    #[tokio::test]
    async fn test_resumes_after_stored_version() {
        let temp = TempDir::new().unwrap();
        let mut state = legacy_state();
        state.migration_version = Some("0.3.1".into());
        let registry = Registry::with_state(temp.path().join("r.json"), state);

        let report = MigrationRunner::with_steps(default_migrations(), "0.4.0")
            .run(&registry)
            .await
            .unwrap();
        assert_eq!(report.applied, vec!["0.4.0"]);
        // The 0.3.1 step was skipped, so the placeholder group survives.
        assert!(registry
            .snapshot()
            .await
            .groups
            .iter()
            .any(|g| g.id == "default"));
    }
}
