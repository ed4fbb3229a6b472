//! Applies changes received from collaborators to the local store.

use crate::error::{Error, Result};
use crate::events::{ChangeNotice, EventBus, SyncEvent};
use crate::models::{ChangeRecord, ChangeStatus, ChangeType};
use crate::store::LocalStore;

/// Writes remote changes straight into the store.
///
/// Remote changes win: no version check is made against the local copy, and
/// nothing is appended to the local change log so applied changes are never
/// echoed back to the peer.
#[derive(Clone)]
pub struct ChangeApplier {
    store: LocalStore,
    events: EventBus,
}

impl ChangeApplier {
    pub const fn new(store: LocalStore, events: EventBus) -> Self {
        Self { store, events }
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Apply one change and notify subscribers.
    pub async fn apply_remote_change(&self, change: &ChangeRecord) -> Result<()> {
        match change.change_type {
            ChangeType::Create | ChangeType::Update => {
                let data = change.data.as_ref().ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "{} change {} for {} {} carries no data",
                        change.change_type, change.id, change.entity, change.entity_id
                    ))
                })?;
                if data.id != change.entity_id {
                    return Err(Error::InvalidInput(format!(
                        "{} change {} targets {} {} but carries {}",
                        change.change_type, change.id, change.entity, change.entity_id, data.id
                    )));
                }
                self.store.put(change.entity, data).await?;
            }
            ChangeType::Delete => {
                if !self.store.delete(change.entity, &change.entity_id).await? {
                    tracing::debug!(
                        "Remote delete of missing {} {}",
                        change.entity,
                        change.entity_id
                    );
                }
            }
        }

        let notice = ChangeNotice::from_change(change);
        tracing::info!("{}", notice.message());
        self.events.publish(SyncEvent::RemoteChange(notice));
        Ok(())
    }

    /// Apply changes in order, stopping at the first failure.
    pub async fn apply_batch(&self, changes: &[ChangeRecord]) -> Result<usize> {
        for change in changes {
            self.apply_remote_change(change).await?;
        }
        Ok(changes.len())
    }

    /// Mark a local change as delivered. Returns whether the record exists.
    pub async fn acknowledge(&self, change_id: &str) -> Result<bool> {
        self.store
            .mark_change_status(change_id, ChangeStatus::Synced)
            .await
    }
}
