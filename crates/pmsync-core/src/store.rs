//! Shared local store used by the guard, the applier and the sync session.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::db::{
    ChangeLogRepository, Database, EntityRepository, LibSqlChangeLogRepository,
    LibSqlEntityRepository, LibSqlWatermarkRepository, WatermarkRepository,
};
use crate::error::Result;
use crate::models::{ChangeRecord, ChangeStatus, Entity, EntityKind, Snapshot, SyncWatermark};
use crate::util::rfc3339_now;

/// Durable store for entities, the change log and the sync watermark.
///
/// Every operation completes its database write before returning. Access is
/// serialized through one connection, so readers never observe a half-applied
/// write from another task.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store backed by a database file, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Local store opened at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Exclusive access for multi-statement work such as version-checked writes.
    pub async fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .get(kind, id)
            .await
    }

    pub async fn put(&self, kind: EntityKind, entity: &Entity) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .put(kind, entity)
            .await
    }

    /// Remove an entity; deleting a missing id is a no-op returning `false`.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .delete(kind, id)
            .await
    }

    pub async fn list_all(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .list_all(kind)
            .await
    }

    /// Projects by `companyId`, companies by `name`.
    pub async fn list_by_lookup(&self, kind: EntityKind, value: &str) -> Result<Vec<Entity>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .list_by_lookup(kind, value)
            .await
    }

    pub async fn append_change(&self, record: &ChangeRecord) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlChangeLogRepository::new(db.connection())
            .append(record)
            .await
    }

    pub async fn get_change(&self, id: &str) -> Result<Option<ChangeRecord>> {
        let db = self.db.lock().await;
        LibSqlChangeLogRepository::new(db.connection()).get(id).await
    }

    /// Pending change records stamped at or after `timestamp`, oldest first.
    pub async fn changes_since(&self, timestamp: i64) -> Result<Vec<ChangeRecord>> {
        let db = self.db.lock().await;
        LibSqlChangeLogRepository::new(db.connection())
            .pending_since(timestamp)
            .await
    }

    /// Returns whether the record exists.
    pub async fn mark_change_status(&self, change_id: &str, status: ChangeStatus) -> Result<bool> {
        let db = self.db.lock().await;
        let found = LibSqlChangeLogRepository::new(db.connection())
            .mark_status(change_id, status)
            .await?;
        if !found {
            tracing::warn!("Change record {change_id} not found while marking {status}");
        }
        Ok(found)
    }

    /// Audit view of the change log, newest first.
    pub async fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        let db = self.db.lock().await;
        LibSqlChangeLogRepository::new(db.connection())
            .list(limit)
            .await
    }

    pub async fn count_changes(&self, status: ChangeStatus) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlChangeLogRepository::new(db.connection())
            .count_by_status(status)
            .await
    }

    /// Copy every entity for backup, sorted by id.
    pub async fn export_snapshot(&self) -> Result<Snapshot> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());

        let mut projects = repo.list_all(EntityKind::Project).await?;
        let mut companies = repo.list_all(EntityKind::Company).await?;
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        companies.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(Snapshot {
            projects,
            companies,
            export_time: rfc3339_now(),
        })
    }

    pub async fn load_watermark(&self) -> Result<SyncWatermark> {
        let db = self.db.lock().await;
        LibSqlWatermarkRepository::new(db.connection()).load().await
    }

    pub async fn save_watermark(&self, watermark: &SyncWatermark) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlWatermarkRepository::new(db.connection())
            .save(watermark)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn company(id: &str, name: &str) -> Entity {
        let fields = json!({"id": id, "name": name});
        Entity::from_fields(fields.as_object().cloned().unwrap(), "alice", "t0").unwrap()
    }

    fn pending(id: &str, timestamp: i64) -> ChangeRecord {
        ChangeRecord {
            id: id.to_string(),
            change_type: ChangeType::Create,
            entity: EntityKind::Company,
            entity_id: "C1".to_string(),
            data: Some(company("C1", "Acme")),
            timestamp,
            user_id: "alice".to_string(),
            status: ChangeStatus::Pending,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_entity_contract() {
        let store = LocalStore::open_in_memory().await.unwrap();

        store
            .put(EntityKind::Company, &company("C1", "Acme"))
            .await
            .unwrap();
        store
            .put(EntityKind::Company, &company("C2", "Acme"))
            .await
            .unwrap();

        assert_eq!(
            store.get(EntityKind::Company, "C1").await.unwrap(),
            Some(company("C1", "Acme"))
        );
        assert_eq!(
            store
                .list_by_lookup(EntityKind::Company, "Acme")
                .await
                .unwrap()
                .len(),
            2
        );

        assert!(store.delete(EntityKind::Company, "C1").await.unwrap());
        assert!(!store.delete(EntityKind::Company, "C1").await.unwrap());
        assert_eq!(store.list_all(EntityKind::Company).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_export_snapshot_sorted() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .put(EntityKind::Company, &company("C2", "Beta"))
            .await
            .unwrap();
        store
            .put(EntityKind::Company, &company("C1", "Acme"))
            .await
            .unwrap();

        let snapshot = store.export_snapshot().await.unwrap();
        assert!(snapshot.projects.is_empty());
        assert_eq!(
            snapshot
                .companies
                .iter()
                .map(|entity| entity.id.as_str())
                .collect::<Vec<_>>(),
            vec!["C1", "C2"]
        );
        assert!(!snapshot.export_time.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_change_log_contract() {
        let store = LocalStore::open_in_memory().await.unwrap();

        store.append_change(&pending("c2", 20)).await.unwrap();
        store.append_change(&pending("c1", 10)).await.unwrap();

        let ids: Vec<String> = store
            .changes_since(0)
            .await
            .unwrap()
            .into_iter()
            .map(|change| change.id)
            .collect();
        assert_eq!(ids, vec!["c1".to_string(), "c2".to_string()]);

        assert!(store
            .mark_change_status("c1", ChangeStatus::Synced)
            .await
            .unwrap());
        assert!(!store
            .mark_change_status("missing", ChangeStatus::Synced)
            .await
            .unwrap());

        assert_eq!(store.changes_since(0).await.unwrap().len(), 1);
        assert_eq!(
            store.get_change("c1").await.unwrap().unwrap().status,
            ChangeStatus::Synced
        );
        assert_eq!(store.count_changes(ChangeStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_store_survives_reopen() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("pmsync.db");

        {
            let store = LocalStore::open_path(&db_path).await.unwrap();
            store
                .put(EntityKind::Company, &company("C1", "Acme"))
                .await
                .unwrap();
            store.append_change(&pending("c1", 1)).await.unwrap();
            store
                .save_watermark(&SyncWatermark::advanced(99, 1))
                .await
                .unwrap();
        }

        let store = LocalStore::open_path(&db_path).await.unwrap();
        assert_eq!(store.path(), Some(&db_path));
        assert!(store.get(EntityKind::Company, "C1").await.unwrap().is_some());
        assert_eq!(store.changes_since(0).await.unwrap().len(), 1);
        assert_eq!(store.load_watermark().await.unwrap().last_sync_time, 99);
    }
}
