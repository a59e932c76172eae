//! Directory-backed host.
//!
//! Layout under the root:
//!
//! ```text
//! extensions/<id>/manifest.json
//! extensions/<id>/main.js
//! extensions/<id>/styles.css        (optional)
//! themes/<name>/manifest.json
//! themes/<name>/theme.css
//! enabled-extensions.json           (JSON array of ids)
//! ```

use super::{is_safe_dir_name, ExtensionBundle, ExtensionHost, HostExtension, ThemeBundle};
use crate::config::{AssetConfig, PathsConfig};
use crate::persist::{atomic_read_json, atomic_write_json, atomic_write_text};
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct FsHost {
    root: PathBuf,
    self_id: String,
    /// Serializes read-modify-write cycles on the enabled list.
    enabled_lock: Mutex<()>,
}

impl FsHost {
    pub fn new(root: impl Into<PathBuf>, self_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            self_id: self_id.into(),
            enabled_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn extensions_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::EXTENSIONS_DIR_NAME)
    }

    fn extension_dir(&self, id: &str) -> Result<PathBuf> {
        Ok(self.extensions_dir().join(checked_dir_name("id", id)?))
    }

    fn theme_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(PathsConfig::THEMES_DIR_NAME)
            .join(checked_dir_name("name", name)?))
    }

    fn enabled_path(&self) -> PathBuf {
        self.root.join(PathsConfig::ENABLED_LIST_FILENAME)
    }

    fn read_enabled(&self) -> Result<BTreeSet<String>> {
        Ok(atomic_read_json::<BTreeSet<String>>(&self.enabled_path())?.unwrap_or_default())
    }

    async fn edit_enabled(&self, f: impl FnOnce(&mut BTreeSet<String>)) -> Result<()> {
        let _guard = self.enabled_lock.lock().await;
        let mut enabled = self.read_enabled()?;
        f(&mut enabled);
        atomic_write_json(&self.enabled_path(), &enabled, false)
    }

    async fn read_manifest(dir: &Path) -> Option<HostExtension> {
        let path = dir.join(AssetConfig::MANIFEST);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No readable manifest at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<HostExtension>(&contents) {
            Ok(manifest) if !manifest.id.is_empty() => Some(manifest),
            Ok(_) => {
                warn!("Manifest {} has an empty id, skipping", path.display());
                None
            }
            Err(e) => {
                warn!("Failed to parse manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    fn ensure_installed(&self, id: &str) -> Result<()> {
        if self.extension_dir(id)?.join(AssetConfig::MANIFEST).is_file() {
            Ok(())
        } else {
            Err(SyncError::UnknownExtension { id: id.to_string() })
        }
    }
}

#[async_trait]
impl ExtensionHost for FsHost {
    fn self_id(&self) -> &str {
        &self.self_id
    }

    async fn list_extensions(&self) -> Result<Vec<HostExtension>> {
        let dir = self.extensions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| SyncError::io_with_path(e, &dir))?;
        let mut extensions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io_with_path(e, &dir))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(manifest) = Self::read_manifest(&path).await {
                extensions.push(manifest);
            }
        }
        extensions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(extensions)
    }

    async fn enabled_ids(&self) -> Result<BTreeSet<String>> {
        self.read_enabled()
    }

    async fn enable(&self, id: &str) -> Result<()> {
        self.ensure_installed(id)?;
        self.edit_enabled(|set| {
            set.insert(id.to_string());
        })
        .await?;
        info!("Enabled {}", id);
        Ok(())
    }

    async fn disable(&self, id: &str) -> Result<()> {
        self.edit_enabled(|set| {
            set.remove(id);
        })
        .await?;
        info!("Disabled {}", id);
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<()> {
        let dir = self.extension_dir(id)?;
        if !dir.exists() {
            return Err(SyncError::UnknownExtension { id: id.to_string() });
        }
        self.disable(id).await?;
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| SyncError::io_with_path(e, &dir))?;
        info!("Uninstalled {}", id);
        Ok(())
    }

    async fn reload_manifests(&self) -> Result<()> {
        let count = self.list_extensions().await?.len();
        debug!("Reloaded {} manifests from {}", count, self.root.display());
        Ok(())
    }

    async fn write_extension(&self, bundle: &ExtensionBundle) -> Result<()> {
        let dir = self.extension_dir(&bundle.id)?;
        atomic_write_text(&dir.join(AssetConfig::MANIFEST), &bundle.manifest)?;
        atomic_write_text(&dir.join(AssetConfig::MAIN_BUNDLE), &bundle.main)?;
        let styles = dir.join(AssetConfig::STYLESHEET);
        match &bundle.styles {
            Some(css) => atomic_write_text(&styles, css)?,
            None if styles.exists() => {
                // A stale stylesheet from an older release would still be loaded.
                std::fs::remove_file(&styles).map_err(|e| SyncError::io_with_path(e, &styles))?;
            }
            None => {}
        }
        info!("Wrote extension files to {}", dir.display());
        Ok(())
    }

    async fn write_theme(&self, bundle: &ThemeBundle) -> Result<()> {
        let dir = self.theme_dir(&bundle.name)?;
        atomic_write_text(&dir.join(AssetConfig::MANIFEST), &bundle.manifest)?;
        atomic_write_text(&dir.join(AssetConfig::THEME_STYLESHEETS[0]), &bundle.stylesheet)?;
        info!("Wrote theme files to {}", dir.display());
        Ok(())
    }
}

fn checked_dir_name<'a>(field: &str, name: &'a str) -> Result<&'a str> {
    if is_safe_dir_name(name) {
        Ok(name)
    } else {
        Err(SyncError::Validation {
            field: field.to_string(),
            message: format!("{:?} is not a valid directory name", name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle(id: &str, version: &str) -> ExtensionBundle {
        ExtensionBundle {
            id: id.to_string(),
            manifest: format!(
                r#"{{"id":"{id}","name":"{id} name","version":"{version}","description":"d"}}"#
            ),
            main: "module.exports = {};".to_string(),
            styles: None,
        }
    }

    #[tokio::test]
    async fn test_list_reads_manifests() {
        let temp = TempDir::new().unwrap();
        let host = FsHost::new(temp.path(), "extsync");
        assert!(host.list_extensions().await.unwrap().is_empty());

        host.write_extension(&bundle("beta", "2.0.0")).await.unwrap();
        host.write_extension(&bundle("alpha", "1.0.0")).await.unwrap();
        std::fs::create_dir_all(temp.path().join("extensions").join("broken")).unwrap();
        std::fs::write(
            temp.path().join("extensions").join("broken").join("manifest.json"),
            "{ nope",
        )
        .unwrap();

        let listed = host.list_extensions().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(
            host.installed_version("beta").await.unwrap().as_deref(),
            Some("2.0.0")
        );
    }

    #[tokio::test]
    async fn test_enable_disable_and_uninstall() {
        let temp = TempDir::new().unwrap();
        let host = FsHost::new(temp.path(), "extsync");
        host.write_extension(&bundle("alpha", "1.0.0")).await.unwrap();

        assert!(host.enable("ghost").await.is_err());
        host.enable("alpha").await.unwrap();
        assert!(host.enabled_ids().await.unwrap().contains("alpha"));

        host.disable("alpha").await.unwrap();
        assert!(host.enabled_ids().await.unwrap().is_empty());

        host.enable("alpha").await.unwrap();
        host.uninstall("alpha").await.unwrap();
        assert!(host.list_extensions().await.unwrap().is_empty());
        assert!(host.enabled_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_drops_stale_stylesheet() {
        let temp = TempDir::new().unwrap();
        let host = FsHost::new(temp.path(), "extsync");
        let mut with_css = bundle("alpha", "1.0.0");
        with_css.styles = Some("body {}".into());
        host.write_extension(&with_css).await.unwrap();
        let css = temp.path().join("extensions").join("alpha").join("styles.css");
        assert!(css.exists());

        host.write_extension(&bundle("alpha", "1.1.0")).await.unwrap();
        assert!(!css.exists());
    }

    #[tokio::test]
    async fn test_rejects_names_leaving_the_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("host");
        let host = FsHost::new(&root, "extsync");

        let err = host
            .write_extension(&bundle("../../escaped", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert!(!temp.path().join("escaped").exists());

        let theme = ThemeBundle {
            name: "../outside".into(),
            manifest: "{}".into(),
            stylesheet: "body {}".into(),
        };
        assert!(host.write_theme(&theme).await.is_err());
        assert!(!root.join("outside").exists());

        std::fs::create_dir_all(temp.path().join("victim")).unwrap();
        assert!(host.uninstall("../../victim").await.is_err());
        assert!(temp.path().join("victim").exists());
    }
}
