//! Notifications for presentation layers.

use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Registry contents changed; any open view should refresh.
    RegistryChanged,
    /// An enable/disable call for `id` started (`active`) or finished.
    ApplyingStateChange { id: String, active: bool },
    /// The update status of `id` was recomputed.
    StatusUpdated { id: String },
}

/// Fan-out bus. Sending with no subscribers is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::StatusUpdated { id: "a".into() });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::StatusUpdated { id: "a".into() }
        );
    }

    #[test]
    fn test_emit_without_subscribers() {
        EventBus::new().emit(SyncEvent::RegistryChanged);
    }
}
