//! Components owned by an ExtSync instance.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::events::EventBus;
use crate::host::ExtensionHost;
use crate::install::Installer;
use crate::mirror::{MirrorWatcher, NoteMirror};
use crate::registry::Registry;
use crate::resolver::RepoResolver;
use crate::updates::UpdateChecker;

pub(crate) struct SyncState {
    pub(crate) registry: Registry,
    pub(crate) host: Arc<dyn ExtensionHost>,
    pub(crate) resolver: Arc<RepoResolver>,
    /// `None` when mirroring is disabled.
    pub(crate) mirror: Option<Arc<NoteMirror>>,
    pub(crate) checker: Arc<UpdateChecker>,
    pub(crate) installer: Installer,
    pub(crate) events: EventBus,
    pub(crate) watch: Mutex<Option<WatchHandle>>,
}

/// A running mirror watcher and the task consuming its events.
pub(crate) struct WatchHandle {
    pub(crate) watcher: MirrorWatcher,
    pub(crate) task: JoinHandle<()>,
}
