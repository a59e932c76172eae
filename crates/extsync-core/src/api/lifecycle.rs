//! Startup, reload and mirror watching on ExtSync.

use tracing::{debug, info, warn};

use crate::api::state::WatchHandle;
use crate::cancel::CancellationToken;
use crate::delay::{plan_delayed_startup, run_delayed_startup, DelayedStart};
use crate::error::Result;
use crate::events::SyncEvent;
use crate::migrations::{MigrationReport, MigrationRunner};
use crate::mirror::{run_watch_loop, MirrorWatcher};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::ExtSync;

/// What [`ExtSync::startup`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub migration: MigrationReport,
    pub reconcile: ReconcileReport,
    /// Documents written; zero when mirroring is disabled.
    pub exported: usize,
}

impl ExtSync {
    // ========================================
    // Lifecycle
    // ========================================

    /// Migrate persisted state, reconcile against the host and export every
    /// record to the mirror.
    pub async fn startup(&self) -> Result<StartupReport> {
        let migration = MigrationRunner::new().run(&self.state.registry).await?;
        let reconcile = reconcile(&self.state.registry, self.state.host.as_ref()).await?;
        let exported = match &self.state.mirror {
            Some(mirror) => mirror.export_all().await?,
            None => 0,
        };
        self.state.events.emit(SyncEvent::RegistryChanged);
        info!(
            "Startup complete: migrated to {}, {} extensions tracked, {} documents exported",
            migration.final_version,
            self.state.registry.ids().await.len(),
            exported
        );
        Ok(StartupReport {
            migration,
            reconcile,
            exported,
        })
    }

    /// Re-read host manifests, reconcile and re-export.
    pub async fn reload_extensions(&self) -> Result<ReconcileReport> {
        self.state.host.reload_manifests().await?;
        let report = reconcile(&self.state.registry, self.state.host.as_ref()).await?;
        if let Some(mirror) = &self.state.mirror {
            mirror.export_all().await?;
        }
        self.state.events.emit(SyncEvent::RegistryChanged);
        Ok(report)
    }

    // ========================================
    // Mirror watching
    // ========================================

    /// Start importing external edits of mirror documents.
    ///
    /// Returns `false` when mirroring is disabled. Calling it while already
    /// watching is a no-op.
    pub async fn start_watching(&self) -> Result<bool> {
        let Some(mirror) = self.state.mirror.clone() else {
            debug!("Mirroring disabled, not watching");
            return Ok(false);
        };
        let mut watch = self.state.watch.lock().await;
        if watch.is_some() {
            return Ok(true);
        }
        let (watcher, rx) = MirrorWatcher::start(mirror.dir())?;
        let task = tokio::spawn(run_watch_loop(mirror, rx));
        *watch = Some(WatchHandle { watcher, task });
        Ok(true)
    }

    /// Stop the watcher and wait for the import in progress, if any.
    pub async fn stop_watching(&self) {
        let handle = self.state.watch.lock().await.take();
        if let Some(WatchHandle { watcher, task }) = handle {
            watcher.stop();
            drop(watcher);
            if let Err(e) = task.await {
                warn!("Mirror watch task ended abnormally: {}", e);
            }
            info!("Stopped watching mirror documents");
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.state.watch.lock().await.is_some()
    }

    // ========================================
    // Delayed startup
    // ========================================

    pub async fn delayed_startup_plan(&self) -> Vec<DelayedStart> {
        plan_delayed_startup(&self.state.registry.snapshot().await)
    }

    /// Enable delayed extensions after their delays, if the switch is on.
    pub async fn run_delayed_startup(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let state = self.state.registry.snapshot().await;
        if !state.settings.delayed_startup {
            debug!("Delayed startup switched off");
            return Ok(Vec::new());
        }
        let plan = plan_delayed_startup(&state);
        run_delayed_startup(self.state.host.as_ref(), &plan, cancel).await
    }
}
