//! Entity repository implementation

use crate::error::Result;
use crate::models::{Entity, EntityKind};
use libsql::{params, Connection};

/// Trait for entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Get an entity by ID
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>>;

    /// Insert or fully replace an entity by ID
    async fn put(&self, kind: EntityKind, entity: &Entity) -> Result<()>;

    /// Remove an entity; returns whether a row existed
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool>;

    /// Every stored entity of a kind, in no particular order
    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Entity>>;

    /// Entities whose secondary lookup field equals `value`
    async fn list_by_lookup(&self, kind: EntityKind, value: &str) -> Result<Vec<Entity>>;

    /// Number of entities whose secondary lookup field equals `value`
    async fn count_by_lookup(&self, kind: EntityKind, value: &str) -> Result<usize>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entity from its stored JSON body
    fn parse_entity(row: &libsql::Row) -> Result<Entity> {
        let data: String = row.get(0)?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn collect(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Entity>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(Self::parse_entity(&row)?);
        }
        Ok(entities)
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?", kind.table());
        let mut rows = self.conn.query(&sql, [id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_entity(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, kind: EntityKind, entity: &Entity) -> Result<()> {
        let data = serde_json::to_string(entity)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, lookup, version, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            kind.table()
        );

        self.conn
            .execute(
                &sql,
                params![
                    entity.id.as_str(),
                    entity.lookup_value(kind),
                    entity.version,
                    data,
                    entity.created_at.as_str(),
                    entity.updated_at.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        let rows = self.conn.execute(&sql, [id]).await?;
        Ok(rows > 0)
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let sql = format!("SELECT data FROM {}", kind.table());
        self.collect(&sql, ()).await
    }

    async fn list_by_lookup(&self, kind: EntityKind, value: &str) -> Result<Vec<Entity>> {
        let sql = format!(
            "SELECT data FROM {} WHERE lookup = ? ORDER BY id",
            kind.table()
        );
        self.collect(&sql, [value]).await
    }

    async fn count_by_lookup(&self, kind: EntityKind, value: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE lookup = ?", kind.table());
        let mut rows = self.conn.query(&sql, [value]).await?;

        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn project(id: &str, company: &str) -> Entity {
        let fields = json!({"id": id, "name": format!("Project {id}"), "companyId": company});
        Entity::from_fields(fields.as_object().cloned().unwrap(), "alice", "t0").unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection());

        let entity = project("P1", "C1");
        repo.put(EntityKind::Project, &entity).await.unwrap();

        let fetched = repo.get(EntityKind::Project, "P1").await.unwrap().unwrap();
        assert_eq!(fetched, entity);

        // Kinds live in separate collections
        assert!(repo.get(EntityKind::Company, "P1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_replaces_whole_document() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection());

        let mut entity = project("P1", "C1");
        entity.fields.insert("budget".to_string(), json!(100));
        repo.put(EntityKind::Project, &entity).await.unwrap();

        let replacement = project("P1", "C2");
        repo.put(EntityKind::Project, &replacement).await.unwrap();

        let fetched = repo.get(EntityKind::Project, "P1").await.unwrap().unwrap();
        assert!(!fetched.fields.contains_key("budget"));
        assert_eq!(repo.list_all(EntityKind::Project).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_reports_absence() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection());

        repo.put(EntityKind::Project, &project("P1", "C1"))
            .await
            .unwrap();
        assert!(repo.delete(EntityKind::Project, "P1").await.unwrap());
        assert!(!repo.delete(EntityKind::Project, "P1").await.unwrap());
        assert!(repo.get(EntityKind::Project, "P1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lookup_by_company() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection());

        repo.put(EntityKind::Project, &project("P1", "C1"))
            .await
            .unwrap();
        repo.put(EntityKind::Project, &project("P2", "C1"))
            .await
            .unwrap();
        repo.put(EntityKind::Project, &project("P3", "C2"))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list_by_lookup(EntityKind::Project, "C1")
            .await
            .unwrap()
            .into_iter()
            .map(|entity| entity.id)
            .collect();
        assert_eq!(ids, vec!["P1".to_string(), "P2".to_string()]);
        assert_eq!(
            repo.count_by_lookup(EntityKind::Project, "C2").await.unwrap(),
            1
        );
        assert_eq!(
            repo.count_by_lookup(EntityKind::Project, "C9").await.unwrap(),
            0
        );
    }
}
