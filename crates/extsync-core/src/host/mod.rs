//! The host extension runtime as seen by the sync engine.
//!
//! The engine treats the host as an opaque capability set. [`FsHost`] backs
//! it with a directory tree for the command-line driver, [`MemoryHost`]
//! keeps everything in memory and can be told to fail.

mod fs;
mod memory;

pub use fs::FsHost;
pub use memory::MemoryHost;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path};

/// True when `name` can be used as a single directory name under a host
/// folder: one plain path component, no separators, no `..`.
pub fn is_safe_dir_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\', ':', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Metadata the host reports for one installed extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostExtension {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

/// Files of an extension release, ready to be placed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionBundle {
    pub id: String,
    pub manifest: String,
    pub main: String,
    pub styles: Option<String>,
}

/// Files of a theme release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeBundle {
    pub name: String,
    pub manifest: String,
    pub stylesheet: String,
}

/// Operations the engine needs from the host runtime.
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    /// Id of the extension running this engine. It is never tracked.
    fn self_id(&self) -> &str;

    /// All installed extensions.
    async fn list_extensions(&self) -> Result<Vec<HostExtension>>;

    /// Ids of extensions currently running.
    async fn enabled_ids(&self) -> Result<BTreeSet<String>>;

    async fn enable(&self, id: &str) -> Result<()>;

    async fn disable(&self, id: &str) -> Result<()>;

    async fn uninstall(&self, id: &str) -> Result<()>;

    /// Re-read manifests from storage after files changed underneath.
    async fn reload_manifests(&self) -> Result<()>;

    async fn write_extension(&self, bundle: &ExtensionBundle) -> Result<()>;

    async fn write_theme(&self, bundle: &ThemeBundle) -> Result<()>;

    /// Version of an installed extension, if the host knows it.
    async fn installed_version(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .list_extensions()
            .await?
            .into_iter()
            .find(|e| e.id == id)
            .map(|e| e.version)
            .filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_dir_names() {
        assert!(is_safe_dir_name("sample-ext"));
        assert!(is_safe_dir_name("Dark Theme v2"));
        assert!(is_safe_dir_name("..hidden-ish"));

        for bad in ["", "  ", ".", "..", "../../escaped", "a/b", "a\\b", "/abs", "C:evil", "x\0y"] {
            assert!(!is_safe_dir_name(bad), "{:?} accepted", bad);
        }
    }
}
