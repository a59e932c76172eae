//! File system watcher for the mirror directory.
//!
//! Debounced events are forwarded from a watcher thread into a tokio channel.
//! [`run_watch_loop`] is the only consumer, so every import runs to
//! completion before the next event is looked at.

use super::{ImportOutcome, NoteMirror};
use crate::config::MirrorConfig;
use crate::{Result, SyncError};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_QUEUE: usize = 256;

pub struct MirrorWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    stop_tx: std_mpsc::Sender<()>,
}

impl MirrorWatcher {
    /// Start watching `dir`. Changed document paths arrive on the receiver.
    pub fn start(dir: impl AsRef<Path>) -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| SyncError::io_with_path(e, &dir))?;

        let (event_tx, event_rx) = std_mpsc::channel();
        let mut debouncer =
            new_debouncer(MirrorConfig::WATCH_DEBOUNCE, event_tx).map_err(|e| SyncError::Config {
                message: format!("Failed to create file watcher: {}", e),
            })?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::Config {
                message: format!("Failed to watch {}: {}", dir.display(), e),
            })?;
        info!("Watching mirror documents in {}", dir.display());

        let (path_tx, path_rx) = mpsc::channel(EVENT_QUEUE);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::spawn(move || loop {
            if stop_rx.try_recv().is_ok() {
                debug!("Mirror watcher stopping");
                break;
            }
            match event_rx.recv_timeout(MirrorConfig::WATCH_POLL_INTERVAL) {
                Ok(Ok(events)) => {
                    for event in events {
                        if event.kind != DebouncedEventKind::Any {
                            continue;
                        }
                        if path_tx.blocking_send(event.path).is_err() {
                            debug!("Mirror event consumer gone");
                            return;
                        }
                    }
                }
                Ok(Err(e)) => warn!("Mirror watcher error: {}", e),
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("Mirror watcher channel disconnected");
                    break;
                }
            }
        });

        Ok((
            Self {
                _debouncer: debouncer,
                stop_tx,
            },
            path_rx,
        ))
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for MirrorWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Feed every changed path to `mirror`, one at a time, until the channel closes.
pub async fn run_watch_loop(mirror: Arc<NoteMirror>, mut rx: mpsc::Receiver<PathBuf>) {
    while let Some(path) = rx.recv().await {
        match mirror.handle_document_changed(&path).await {
            Ok(ImportOutcome::Applied { id }) => debug!("Applied edits from {} to {}", path.display(), id),
            Ok(ImportOutcome::Skipped(reason)) => {
                debug!("Skipped {}: {:?}", path.display(), reason)
            }
            Err(e) => warn!("Failed to import {}: {}", path.display(), e),
        }
    }
    debug!("Mirror watch loop finished");
}
