//! Notifications published to UI collaborators.

use tokio::sync::broadcast;

use crate::models::{ChangeRecord, ChangeType, EntityKind};
use crate::state::SessionState;

const EVENT_CAPACITY: usize = 256;

/// Something the UI may want to surface.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// A change from another collaborator was applied locally
    RemoteChange(ChangeNotice),
    /// A `sync_response` batch was applied and the watermark advanced
    BatchApplied { changes: usize, watermark: i64 },
    /// Local pending changes were delivered to the peer
    ChangesPushed { changes: usize },
    StateChanged(SessionState),
    /// Reconnect attempts exhausted; the session stays offline
    Offline { attempts: u32 },
}

/// Description of one applied remote change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeNotice {
    pub kind: EntityKind,
    pub change_type: ChangeType,
    pub entity_id: String,
    pub label: String,
    pub user_id: String,
}

impl ChangeNotice {
    pub fn from_change(change: &ChangeRecord) -> Self {
        Self {
            kind: change.entity,
            change_type: change.change_type,
            entity_id: change.entity_id.clone(),
            label: change.label(),
            user_id: change.user_id.clone(),
        }
    }

    /// One-line message, e.g. `bob updated project: Bridge`
    pub fn message(&self) -> String {
        format!(
            "{} {} {}: {}",
            self.user_id,
            self.change_type.verb(),
            self.kind,
            self.label
        )
    }
}

/// Broadcast fan-out for [`SyncEvent`]s. Sending never fails when nobody listens.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        tracing::trace!(?event, "sync event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
