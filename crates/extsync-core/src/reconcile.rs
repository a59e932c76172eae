//! Bring the registry in line with what the host reports.

use crate::host::{ExtensionHost, HostExtension};
use crate::registry::{ExtensionRecord, Registry, RegistryState};
use crate::Result;
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Reconcile `state` against the host list.
///
/// Records the host no longer reports are dropped, new ids are seeded from
/// host metadata, and existing records keep every user-assigned field.
/// `self_id` is never tracked. Extensions installed by this tool get the
/// system tag.
pub fn reconcile_records(
    state: &mut RegistryState,
    host_list: &[HostExtension],
    enabled: &BTreeSet<String>,
    self_id: &str,
) -> ReconcileReport {
    let reported: BTreeSet<&str> = host_list
        .iter()
        .map(|e| e.id.as_str())
        .filter(|id| !id.is_empty() && *id != self_id)
        .collect();

    let mut report = ReconcileReport::default();
    state.extensions.retain(|record| {
        let keep = reported.contains(record.id.as_str());
        if !keep {
            report.removed.push(record.id.clone());
        }
        keep
    });

    for extension in host_list {
        if !reported.contains(extension.id.as_str()) || state.extension(&extension.id).is_some() {
            continue;
        }
        state.extensions.push(ExtensionRecord::from_host(
            &extension.id,
            &extension.name,
            &extension.description,
            enabled.contains(&extension.id),
        ));
        report.added.push(extension.id.clone());
    }

    let installed = state.settings.installed_by_tool.clone();
    let tagged = state
        .extensions
        .iter()
        .any(|r| installed.contains(&r.id) || r.is_tool_installed());
    if tagged {
        state.ensure_installed_tag();
        for record in &mut state.extensions {
            if installed.contains(&record.id) {
                record
                    .tag_ids
                    .insert(crate::config::AppConfig::INSTALLED_TAG_ID.to_string());
            }
        }
    }

    report
}

/// Query the host, reconcile and persist.
///
/// A failing host call aborts before the registry is touched.
pub async fn reconcile(registry: &Registry, host: &dyn ExtensionHost) -> Result<ReconcileReport> {
    let listed = host.list_extensions().await?;
    let enabled = host.enabled_ids().await?;
    let self_id = host.self_id().to_string();

    let report = registry
        .update(|state| Ok(reconcile_records(state, &listed, &enabled, &self_id)))
        .await?;
    registry.save().await?;

    if report.is_empty() {
        debug!("Registry already matches host ({} extensions)", listed.len());
    } else {
        info!(
            "Reconciled registry: {} added, {} removed",
            report.added.len(),
            report.removed.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::host::MemoryHost;
    use tempfile::TempDir;

    fn ext(id: &str) -> HostExtension {
        HostExtension {
            id: id.into(),
            name: format!("{} name", id),
            description: String::new(),
            version: "1.0.0".into(),
        }
    }

    #[test]
    fn test_closure_and_preserved_fields() {
        let mut state = RegistryState::default();
        let mut kept = ExtensionRecord::from_host("kept", "Kept", "", false);
        kept.user_note = "my note".into();
        kept.group_id = Some("g".into());
        kept.delay_profile_id = Some("d".into());
        state.extensions.push(kept.clone());
        state
            .extensions
            .push(ExtensionRecord::from_host("gone", "Gone", "", true));

        let enabled: BTreeSet<String> = ["fresh".to_string(), "kept".to_string()].into();
        let report = reconcile_records(
            &mut state,
            &[ext("kept"), ext("fresh"), ext("extsync")],
            &enabled,
            "extsync",
        );

        let ids: BTreeSet<_> = state.extensions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["fresh", "kept"].into());
        assert_eq!(report.added, vec!["fresh"]);
        assert_eq!(report.removed, vec!["gone"]);
        assert_eq!(state.extension("kept"), Some(&kept));
        assert!(state.extension("fresh").unwrap().enabled);
    }

    #[test]
    fn test_installed_by_tool_gets_system_tag() {
        let mut state = RegistryState::default();
        state.settings.installed_by_tool.insert("alpha".into());
        reconcile_records(&mut state, &[ext("alpha"), ext("beta")], &BTreeSet::new(), "x");

        assert!(state.has_tag(AppConfig::INSTALLED_TAG_ID));
        assert!(state.extension("alpha").unwrap().is_tool_installed());
        assert!(!state.extension("beta").unwrap().is_tool_installed());
    }

    #[tokio::test]
    async fn test_host_failure_leaves_registry_untouched() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(temp.path().join("r.json")).unwrap();
        registry
            .insert(ExtensionRecord::from_host("alpha", "Alpha", "", true))
            .await
            .unwrap();
        let host = MemoryHost::new("extsync");
        host.set_fail_listing(true);

        assert!(reconcile(&registry, &host).await.is_err());
        assert!(registry.contains("alpha").await);
        assert!(!registry.path().exists());
    }
}
