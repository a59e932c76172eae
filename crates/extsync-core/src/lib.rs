//! extsync core - headless engine that keeps an extension registry in sync.
//!
//! Three views of the installed extensions are kept consistent: what the
//! host runtime reports, one editable markdown document per extension in a
//! mirror directory, and remote version and repository records.
//!
//! # Example
//!
//! ```rust,ignore
//! use extsync_core::{ExtSync, FsHost};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> extsync_core::Result<()> {
//!     let root = "/path/to/config";
//!     let sync = ExtSync::builder(root)
//!         .host(Arc::new(FsHost::new(root, "extsync")))
//!         .build()
//!         .await?;
//!
//!     let report = sync.startup().await?;
//!     println!("Tracking {} new extensions", report.reconcile.added.len());
//!
//!     sync.start_watching().await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod delay;
pub mod error;
pub mod events;
pub mod host;
pub mod install;
pub mod migrations;
pub mod mirror;
pub mod network;
pub mod persist;
pub mod reconcile;
pub mod registry;
pub mod repo_id;
pub mod resolver;
pub mod updates;
pub mod version;

mod api;

// Re-export commonly used types
pub use api::{StartupReport, SyncBuilder};
pub use cancel::{CancellationToken, NoProgress, ProgressSink};
pub use delay::DelayedStart;
pub use error::{FailureCategory, Result, SyncError};
pub use events::{EventBus, SyncEvent};
pub use host::{ExtensionHost, FsHost, HostExtension, MemoryHost};
pub use install::{InstallReport, ThemeInstallReport};
pub use migrations::MigrationReport;
pub use mirror::{ImportOutcome, NoteMirror, SkipReason};
pub use reconcile::ReconcileReport;
pub use registry::{DelayProfile, ExtensionRecord, Group, Registry, RegistryState, Settings, Tag};
pub use repo_id::normalize_repository;
pub use resolver::RepoResolver;
pub use updates::{ReleaseVersion, UpdateChecker, VersionSource, VersionStatus};
pub use version::compare_versions;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use api::SyncState;

/// Main entry point of the sync engine.
///
/// Owns the registry and every component wired around it. Build one with
/// [`ExtSync::builder`], then call [`ExtSync::startup`] once.
pub struct ExtSync {
    /// Directory holding the registry and the repository cache
    data_dir: PathBuf,
    state: Arc<SyncState>,
}

impl ExtSync {
    /// Create a builder for ExtSync.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let sync = ExtSync::builder("./config")
    ///     .host(host)
    ///     .mirror_dir("./notes/extensions")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder(data_dir: impl Into<PathBuf>) -> SyncBuilder {
        SyncBuilder::new(data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Mirror directory, or `None` when mirroring is disabled.
    pub fn mirror_dir(&self) -> Option<&Path> {
        self.state.mirror.as_deref().map(NoteMirror::dir)
    }

    pub fn registry(&self) -> &Registry {
        &self.state.registry
    }

    pub fn host(&self) -> &Arc<dyn ExtensionHost> {
        &self.state.host
    }

    pub fn mirror(&self) -> Option<&Arc<NoteMirror>> {
        self.state.mirror.as_ref()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.state.events.subscribe()
    }
}
