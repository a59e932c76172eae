//! Builder for configuring ExtSync initialization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::state::SyncState;
use crate::config::PathsConfig;
use crate::error::{Result, SyncError};
use crate::events::EventBus;
use crate::host::ExtensionHost;
use crate::install::Installer;
use crate::mirror::NoteMirror;
use crate::network::{
    CommunityIndexSource, GitHubClient, HttpClient, OfficialFeedSource, ReleaseSource, RemoteFeeds,
};
use crate::registry::Registry;
use crate::resolver::RepoResolver;
use crate::updates::UpdateChecker;
use crate::ExtSync;

/// Builder for configuring ExtSync initialization.
///
/// Remote sources default to the live GitHub and feed clients. Tests and
/// embedders inject their own through the `with_*` methods.
///
/// # Example
///
/// ```rust,ignore
/// use extsync_core::{ExtSync, FsHost};
/// use std::sync::Arc;
///
/// let sync = ExtSync::builder("./vault-config")
///     .host(Arc::new(FsHost::new("./vault-config", "extsync")))
///     .auto_create_dirs(true)
///     .build()
///     .await?;
/// ```
pub struct SyncBuilder {
    data_dir: PathBuf,
    host: Option<Arc<dyn ExtensionHost>>,
    official: Option<Arc<dyn OfficialFeedSource>>,
    community: Option<Arc<dyn CommunityIndexSource>>,
    releases: Option<Arc<dyn ReleaseSource>>,
    mirror_dir: Option<PathBuf>,
    github_token: Option<String>,
    auto_create_dirs: bool,
}

impl SyncBuilder {
    /// Create a new builder around the data directory holding the registry.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            host: None,
            official: None,
            community: None,
            releases: None,
            mirror_dir: None,
            github_token: None,
            auto_create_dirs: false,
        }
    }

    /// Host runtime to reconcile against. Required.
    pub fn host(mut self, host: Arc<dyn ExtensionHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_official_feed(mut self, source: Arc<dyn OfficialFeedSource>) -> Self {
        self.official = Some(source);
        self
    }

    pub fn with_community_index(mut self, source: Arc<dyn CommunityIndexSource>) -> Self {
        self.community = Some(source);
        self
    }

    pub fn with_release_source(mut self, source: Arc<dyn ReleaseSource>) -> Self {
        self.releases = Some(source);
        self
    }

    /// Mirror documents into `dir`, ignoring the persisted setting.
    pub fn mirror_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mirror_dir = Some(dir.into());
        self
    }

    /// Token for GitHub requests. Takes precedence over the persisted one.
    pub fn github_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !token.trim().is_empty() {
            self.github_token = Some(token);
        }
        self
    }

    /// Create the data directory if it does not exist.
    ///
    /// Default: `false` (the directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if self.data_dir.exists() {
            return Ok(());
        }
        if !self.auto_create_dirs {
            return Err(SyncError::Config {
                message: format!("Data directory does not exist: {}", self.data_dir.display()),
            });
        }
        std::fs::create_dir_all(&self.data_dir).map_err(|e| SyncError::Io {
            message: format!("Failed to create data directory: {}", self.data_dir.display()),
            path: Some(self.data_dir.clone()),
            source: Some(e),
        })
    }

    /// Build the ExtSync instance.
    pub async fn build(self) -> Result<ExtSync> {
        self.ensure_data_dir()?;
        let host = self.host.clone().ok_or_else(|| SyncError::Config {
            message: "No extension host configured".into(),
        })?;

        let registry = Registry::load(self.data_dir.join(PathsConfig::REGISTRY_FILENAME))?;
        let settings = registry.settings().await;

        let token = self
            .github_token
            .clone()
            .or_else(|| settings.token().map(str::to_string));
        let http = Arc::new(HttpClient::new(token)?);
        // Feeds are served from other hosts and never get the token.
        let feeds = Arc::new(RemoteFeeds::new(Arc::new(HttpClient::new(None)?)));
        let official: Arc<dyn OfficialFeedSource> = match self.official {
            Some(source) => source,
            None => feeds.clone(),
        };
        let community: Arc<dyn CommunityIndexSource> = match self.community {
            Some(source) => source,
            None => feeds,
        };
        let releases: Arc<dyn ReleaseSource> = match self.releases {
            Some(source) => source,
            None => Arc::new(GitHubClient::new(http)),
        };

        let events = EventBus::new();
        let resolver = Arc::new(RepoResolver::new(
            registry.clone(),
            community,
            self.data_dir.join(PathsConfig::REPO_CACHE_FILENAME),
        ));

        let mirror_dir = self
            .mirror_dir
            .or_else(|| mirror_dir_from_setting(&self.data_dir, &settings.mirror_dir));
        let mirror = mirror_dir.map(|dir| {
            Arc::new(NoteMirror::new(
                dir,
                registry.clone(),
                resolver.clone(),
                host.clone(),
                events.clone(),
            ))
        });

        let checker = Arc::new(UpdateChecker::new(
            registry.clone(),
            resolver.clone(),
            host.clone(),
            official,
            releases.clone(),
            events.clone(),
        ));
        let installer = Installer::new(
            registry.clone(),
            resolver.clone(),
            host.clone(),
            releases,
            checker.clone(),
            mirror.clone(),
            events.clone(),
        );

        Ok(ExtSync {
            data_dir: self.data_dir,
            state: Arc::new(SyncState {
                registry,
                host,
                resolver,
                mirror,
                checker,
                installer,
                events,
                watch: Mutex::new(None),
            }),
        })
    }
}

/// Mirror directory named by the persisted setting. Empty disables mirroring.
fn mirror_dir_from_setting(data_dir: &Path, setting: &str) -> Option<PathBuf> {
    let setting = setting.trim();
    if setting.is_empty() {
        return None;
    }
    let dir = Path::new(setting);
    Some(if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        data_dir.join(dir)
    })
}
