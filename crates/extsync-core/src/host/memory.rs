//! In-memory host with failure injection.

use super::{ExtensionBundle, ExtensionHost, HostExtension, ThemeBundle};
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    extensions: BTreeMap<String, HostExtension>,
    enabled: BTreeSet<String>,
    themes: BTreeMap<String, ThemeBundle>,
    bundles: BTreeMap<String, ExtensionBundle>,
    calls: Vec<String>,
}

/// Host that keeps its extension list in memory.
///
/// `fail_listing` makes `list_extensions`/`enabled_ids` fail and
/// `fail_toggles` makes `enable`/`disable` fail, for exercising error paths.
pub struct MemoryHost {
    self_id: String,
    inner: Mutex<Inner>,
    fail_listing: AtomicBool,
    fail_toggles: AtomicBool,
}

impl MemoryHost {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            inner: Mutex::new(Inner::default()),
            fail_listing: AtomicBool::new(false),
            fail_toggles: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::host("lock", "host state poisoned"))
    }

    /// Register an installed extension, optionally running.
    pub fn add(&self, extension: HostExtension, enabled: bool) {
        if let Ok(mut inner) = self.lock() {
            if enabled {
                inner.enabled.insert(extension.id.clone());
            }
            inner.extensions.insert(extension.id.clone(), extension);
        }
    }

    /// Convenience wrapper around [`MemoryHost::add`].
    pub fn add_simple(&self, id: &str, version: &str, enabled: bool) {
        self.add(
            HostExtension {
                id: id.to_string(),
                name: format!("{} name", id),
                description: format!("{} description", id),
                version: version.to_string(),
            },
            enabled,
        );
    }

    /// Drop an extension as if it had been removed outside the engine.
    pub fn forget(&self, id: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.extensions.remove(id);
            inner.enabled.remove(id);
        }
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_toggles(&self, fail: bool) {
        self.fail_toggles.store(fail, Ordering::SeqCst);
    }

    /// Operations performed so far, as `"<op> <id>"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().map(|i| i.calls.clone()).unwrap_or_default()
    }

    pub fn bundle(&self, id: &str) -> Option<ExtensionBundle> {
        self.lock().ok()?.bundles.get(id).cloned()
    }

    pub fn theme(&self, name: &str) -> Option<ThemeBundle> {
        self.lock().ok()?.themes.get(name).cloned()
    }

    fn record(&self, call: String) -> Result<()> {
        self.lock()?.calls.push(call);
        Ok(())
    }

    fn check_toggle(&self, op: &str) -> Result<()> {
        if self.fail_toggles.load(Ordering::SeqCst) {
            return Err(SyncError::host(op, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ExtensionHost for MemoryHost {
    fn self_id(&self) -> &str {
        &self.self_id
    }

    async fn list_extensions(&self) -> Result<Vec<HostExtension>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::host("list_extensions", "injected failure"));
        }
        Ok(self.lock()?.extensions.values().cloned().collect())
    }

    async fn enabled_ids(&self) -> Result<BTreeSet<String>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::host("enabled_ids", "injected failure"));
        }
        Ok(self.lock()?.enabled.clone())
    }

    async fn enable(&self, id: &str) -> Result<()> {
        self.record(format!("enable {}", id))?;
        self.check_toggle("enable")?;
        let mut inner = self.lock()?;
        if !inner.extensions.contains_key(id) {
            return Err(SyncError::UnknownExtension { id: id.to_string() });
        }
        inner.enabled.insert(id.to_string());
        Ok(())
    }

    async fn disable(&self, id: &str) -> Result<()> {
        self.record(format!("disable {}", id))?;
        self.check_toggle("disable")?;
        self.lock()?.enabled.remove(id);
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<()> {
        self.record(format!("uninstall {}", id))?;
        let mut inner = self.lock()?;
        if inner.extensions.remove(id).is_none() {
            return Err(SyncError::UnknownExtension { id: id.to_string() });
        }
        inner.enabled.remove(id);
        inner.bundles.remove(id);
        Ok(())
    }

    async fn reload_manifests(&self) -> Result<()> {
        self.record("reload".to_string())?;
        let mut inner = self.lock()?;
        let parsed: Vec<HostExtension> = inner
            .bundles
            .values()
            .filter_map(|b| serde_json::from_str::<HostExtension>(&b.manifest).ok())
            .collect();
        for manifest in parsed {
            inner.extensions.insert(manifest.id.clone(), manifest);
        }
        Ok(())
    }

    async fn write_extension(&self, bundle: &ExtensionBundle) -> Result<()> {
        self.record(format!("write {}", bundle.id))?;
        self.lock()?
            .bundles
            .insert(bundle.id.clone(), bundle.clone());
        Ok(())
    }

    async fn write_theme(&self, bundle: &ThemeBundle) -> Result<()> {
        self.record(format!("theme {}", bundle.name))?;
        self.lock()?
            .themes
            .insert(bundle.name.clone(), bundle.clone());
        Ok(())
    }
}
