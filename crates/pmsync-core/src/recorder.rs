//! Change capture for local mutations.

use std::sync::{Arc, RwLock};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::db::{ChangeLogRepository, Database, LibSqlChangeLogRepository};
use crate::error::Result;
use crate::models::{ChangeRecord, ChangeStatus, ChangeType, Entity, EntityKind, SYSTEM_ACTOR};
use crate::util::monotonic_millis;

/// The user on whose behalf local writes are made.
///
/// Shared between the recorder, the guard and the engine; `None` means the
/// `system` sentinel is recorded.
#[derive(Clone, Debug, Default)]
pub struct Actor {
    current: Arc<RwLock<Option<String>>>,
}

impl Actor {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            current: Arc::new(RwLock::new(user_id)),
        }
    }

    pub fn set(&self, user_id: Option<String>) {
        if let Ok(mut current) = self.current.write() {
            *current = user_id;
        }
    }

    /// Current user id, or the system sentinel.
    pub fn id(&self) -> String {
        self.current
            .read()
            .ok()
            .and_then(|current| current.clone())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string())
    }
}

/// Builds change records and appends them inside the caller's transaction.
#[derive(Clone, Debug)]
pub struct ChangeRecorder {
    actor: Actor,
    wake: Arc<Notify>,
}

impl ChangeRecorder {
    /// `wake` is signalled after each committed mutation so a connected
    /// session can push without waiting for its periodic timer.
    pub const fn new(actor: Actor, wake: Arc<Notify>) -> Self {
        Self { actor, wake }
    }

    pub const fn actor(&self) -> &Actor {
        &self.actor
    }

    /// A fresh pending record for one accepted mutation.
    pub fn build(
        &self,
        change_type: ChangeType,
        kind: EntityKind,
        entity_id: &str,
        data: Option<Entity>,
    ) -> ChangeRecord {
        ChangeRecord {
            id: Uuid::now_v7().to_string(),
            change_type,
            entity: kind,
            entity_id: entity_id.to_string(),
            data,
            timestamp: monotonic_millis(),
            user_id: self.actor.id(),
            status: ChangeStatus::Pending,
        }
    }

    /// Append `record` on `db`. The caller owns the surrounding transaction and
    /// must roll back its entity write when this fails.
    pub async fn append(&self, db: &Database, record: &ChangeRecord) -> Result<()> {
        LibSqlChangeLogRepository::new(db.connection())
            .append(record)
            .await?;
        tracing::debug!(
            change = %record.id,
            kind = %record.entity,
            entity = %record.entity_id,
            "Recorded {} change",
            record.change_type
        );
        Ok(())
    }

    /// Signal that a mutation committed and pending changes are waiting.
    pub fn committed(&self) {
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> ChangeRecorder {
        ChangeRecorder::new(Actor::default(), Arc::new(Notify::new()))
    }

    #[test]
    fn test_actor_defaults_to_system() {
        let actor = Actor::default();
        assert_eq!(actor.id(), SYSTEM_ACTOR);

        actor.set(Some("alice".to_string()));
        assert_eq!(actor.id(), "alice");

        actor.set(None);
        assert_eq!(actor.id(), SYSTEM_ACTOR);
    }

    #[test]
    fn test_build_pending_record() {
        let recorder = recorder();
        recorder.actor().set(Some("bob".to_string()));

        let first = recorder.build(ChangeType::Delete, EntityKind::Company, "C1", None);
        let second = recorder.build(ChangeType::Delete, EntityKind::Company, "C2", None);

        assert!(first.is_pending());
        assert_eq!(first.user_id, "bob");
        assert_eq!(first.entity_id, "C1");
        assert_ne!(first.id, second.id);
        assert!(second.timestamp > first.timestamp);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_append_persists_record() {
        let db = Database::open_in_memory().await.unwrap();
        let recorder = recorder();

        let record = recorder.build(ChangeType::Delete, EntityKind::Project, "P1", None);
        recorder.append(&db, &record).await.unwrap();

        let stored = LibSqlChangeLogRepository::new(db.connection())
            .get(&record.id)
            .await
            .unwrap();
        assert_eq!(stored, Some(record));
    }

    #[tokio::test]
    async fn test_committed_wakes_listener() {
        let wake = Arc::new(Notify::new());
        let recorder = ChangeRecorder::new(Actor::default(), wake.clone());

        recorder.committed();
        // The stored permit completes the wait immediately
        tokio::time::timeout(std::time::Duration::from_secs(1), wake.notified())
            .await
            .unwrap();
    }
}
