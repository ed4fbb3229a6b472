//! Version-checked writes.
//!
//! Every local mutation goes through [`VersionGuard`]: the stored version is
//! read, compared with the caller's expectation, the entity is written and the
//! change record appended, all inside one transaction while holding the store
//! lock. A caller presenting a stale version gets [`Error::Conflict`] and must
//! re-read before retrying; nothing is merged automatically.

use crate::db::{Database, EntityRepository, LibSqlEntityRepository};
use crate::error::{Error, Result};
use crate::models::{ChangeType, Entity, EntityKind, Fields, Snapshot};
use crate::recorder::ChangeRecorder;
use crate::store::LocalStore;
use crate::util::rfc3339_now;

#[derive(Clone)]
pub struct VersionGuard {
    store: LocalStore,
    recorder: ChangeRecorder,
}

impl VersionGuard {
    pub const fn new(store: LocalStore, recorder: ChangeRecorder) -> Self {
        Self { store, recorder }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Current state of an entity; `NotFound` when absent.
    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        self.store
            .get(kind, id)
            .await?
            .ok_or_else(|| not_found(kind, id))
    }

    /// All entities of a kind, sorted by id.
    pub async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let mut entities = self.store.list_all(kind).await?;
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    /// Insert a new entity at version 1. `fields` must carry the `id`.
    pub async fn create(&self, kind: EntityKind, fields: Fields) -> Result<Entity> {
        let entity = Entity::from_fields(fields, &self.recorder.actor().id(), &rfc3339_now())?;

        let db = self.store.lock().await;
        db.begin().await?;
        let result = self.create_locked(&db, kind, entity).await;
        self.finish(&db, result).await
    }

    /// Merge `patch` into the entity if its stored version is `expected_version`.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Fields,
        expected_version: i64,
    ) -> Result<Entity> {
        let db = self.store.lock().await;
        db.begin().await?;
        let result = self
            .update_locked(&db, kind, id, patch, expected_version)
            .await;
        self.finish(&db, result).await
    }

    /// Remove the entity if its stored version is `expected_version`.
    pub async fn delete(&self, kind: EntityKind, id: &str, expected_version: i64) -> Result<()> {
        let db = self.store.lock().await;
        db.begin().await?;
        let result = self.delete_locked(&db, kind, id, expected_version).await;
        self.finish(&db, result).await
    }

    /// Restore a backup. Every entity is written verbatim and logged as a
    /// create (new id) or update (existing id) so peers receive it.
    pub async fn import_snapshot(&self, snapshot: &Snapshot) -> Result<usize> {
        let db = self.store.lock().await;
        db.begin().await?;
        let result = self.import_locked(&db, snapshot).await;
        self.finish(&db, result).await
    }

    pub async fn create_project(&self, data: Fields) -> Result<Entity> {
        self.create(EntityKind::Project, data).await
    }

    pub async fn update_project(&self, id: &str, patch: Fields, version: i64) -> Result<Entity> {
        self.update(EntityKind::Project, id, patch, version).await
    }

    pub async fn delete_project(&self, id: &str, version: i64) -> Result<()> {
        self.delete(EntityKind::Project, id, version).await
    }

    pub async fn create_company(&self, data: Fields) -> Result<Entity> {
        self.create(EntityKind::Company, data).await
    }

    pub async fn update_company(&self, id: &str, patch: Fields, version: i64) -> Result<Entity> {
        self.update(EntityKind::Company, id, patch, version).await
    }

    pub async fn delete_company(&self, id: &str, version: i64) -> Result<()> {
        self.delete(EntityKind::Company, id, version).await
    }

    async fn create_locked(&self, db: &Database, kind: EntityKind, entity: Entity) -> Result<Entity> {
        let repo = LibSqlEntityRepository::new(db.connection());
        if repo.get(kind, &entity.id).await?.is_some() {
            return Err(Error::Duplicate {
                kind,
                id: entity.id,
            });
        }

        repo.put(kind, &entity).await?;
        let record = self
            .recorder
            .build(ChangeType::Create, kind, &entity.id, Some(entity.clone()));
        self.recorder.append(db, &record).await?;
        Ok(entity)
    }

    async fn update_locked(
        &self,
        db: &Database,
        kind: EntityKind,
        id: &str,
        patch: Fields,
        expected_version: i64,
    ) -> Result<Entity> {
        let repo = LibSqlEntityRepository::new(db.connection());
        let current = repo.get(kind, id).await?.ok_or_else(|| not_found(kind, id))?;
        check_version(kind, &current, expected_version)?;

        let next = current.next_revision(patch, &self.recorder.actor().id(), &rfc3339_now());
        repo.put(kind, &next).await?;
        let record = self
            .recorder
            .build(ChangeType::Update, kind, id, Some(next.clone()));
        self.recorder.append(db, &record).await?;
        Ok(next)
    }

    async fn delete_locked(
        &self,
        db: &Database,
        kind: EntityKind,
        id: &str,
        expected_version: i64,
    ) -> Result<()> {
        let repo = LibSqlEntityRepository::new(db.connection());
        let current = repo.get(kind, id).await?.ok_or_else(|| not_found(kind, id))?;
        check_version(kind, &current, expected_version)?;

        if kind == EntityKind::Company {
            let count = repo.count_by_lookup(EntityKind::Project, id).await?;
            if count > 0 {
                return Err(Error::InUse {
                    kind,
                    id: id.to_string(),
                    count,
                });
            }
        }

        repo.delete(kind, id).await?;
        let record = self.recorder.build(ChangeType::Delete, kind, id, None);
        self.recorder.append(db, &record).await?;
        Ok(())
    }

    async fn import_locked(&self, db: &Database, snapshot: &Snapshot) -> Result<usize> {
        let repo = LibSqlEntityRepository::new(db.connection());
        let mut imported = 0;

        for kind in EntityKind::ALL {
            for entity in snapshot.entities(kind) {
                if entity.id.trim().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "snapshot contains a {kind} without an id"
                    )));
                }
                let change_type = if repo.get(kind, &entity.id).await?.is_some() {
                    ChangeType::Update
                } else {
                    ChangeType::Create
                };

                repo.put(kind, entity).await?;
                let record = self
                    .recorder
                    .build(change_type, kind, &entity.id, Some(entity.clone()));
                self.recorder.append(db, &record).await?;
                imported += 1;
            }
        }

        tracing::info!("Imported {imported} entities from snapshot");
        Ok(imported)
    }

    /// Commit on success, roll back on failure. The session is woken only
    /// once the change record is durable.
    async fn finish<T>(&self, db: &Database, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                db.commit().await?;
                self.recorder.committed();
                Ok(value)
            }
            Err(error) => {
                db.rollback().await;
                if error.is_recoverable() {
                    tracing::debug!("Write rejected: {error}");
                } else {
                    tracing::error!("Write failed: {error}");
                }
                Err(error)
            }
        }
    }
}

fn not_found(kind: EntityKind, id: &str) -> Error {
    Error::NotFound(format!("{kind} {id}"))
}

fn check_version(kind: EntityKind, current: &Entity, expected: i64) -> Result<()> {
    if current.version == expected {
        Ok(())
    } else {
        Err(Error::Conflict {
            kind,
            id: current.id.clone(),
            expected,
            actual: current.version,
        })
    }
}
