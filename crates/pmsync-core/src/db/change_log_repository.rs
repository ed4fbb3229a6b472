//! Change log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{ChangeRecord, ChangeStatus, Entity};
use libsql::{params, Connection};

const COLUMNS: &str = "id, change_type, entity, entity_id, data, timestamp, user_id, status";

/// Trait for change log storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ChangeLogRepository {
    /// Append a record; fails if the id was already used
    async fn append(&self, record: &ChangeRecord) -> Result<()>;

    /// Get a record by ID
    async fn get(&self, id: &str) -> Result<Option<ChangeRecord>>;

    /// Pending records stamped at or after `since`, oldest first
    async fn pending_since(&self, since: i64) -> Result<Vec<ChangeRecord>>;

    /// Set a record's status; returns whether the record exists
    async fn mark_status(&self, id: &str, status: ChangeStatus) -> Result<bool>;

    /// Most recent records regardless of status, newest first
    async fn list(&self, limit: usize) -> Result<Vec<ChangeRecord>>;

    /// Number of records with the given status
    async fn count_by_status(&self, status: ChangeStatus) -> Result<usize>;
}

/// libSQL implementation of `ChangeLogRepository`
pub struct LibSqlChangeLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlChangeLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a change record from a database row
    fn parse_record(row: &libsql::Row) -> Result<ChangeRecord> {
        let change_type: String = row.get(1)?;
        let entity: String = row.get(2)?;
        let data: Option<String> = row.get(4)?;
        let status: String = row.get(7)?;

        let data = data
            .map(|data| serde_json::from_str::<Entity>(&data))
            .transpose()?;

        Ok(ChangeRecord {
            id: row.get(0)?,
            change_type: change_type.parse()?,
            entity: entity.parse()?,
            entity_id: row.get(3)?,
            data,
            timestamp: row.get(5)?,
            user_id: row.get(6)?,
            status: status.parse()?,
        })
    }

    async fn collect(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<ChangeRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

impl ChangeLogRepository for LibSqlChangeLogRepository<'_> {
    async fn append(&self, record: &ChangeRecord) -> Result<()> {
        let data = record
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO sync_logs (id, change_type, entity, entity_id, data, timestamp, user_id, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.change_type.as_str(),
                    record.entity.as_str(),
                    record.entity_id.as_str(),
                    data,
                    record.timestamp,
                    record.user_id.as_str(),
                    record.status.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ChangeRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM sync_logs WHERE id = ?");
        let mut rows = self.conn.query(&sql, [id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_record(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn pending_since(&self, since: i64) -> Result<Vec<ChangeRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM sync_logs
             WHERE status = 'pending' AND timestamp >= ?
             ORDER BY timestamp ASC, seq ASC"
        );
        self.collect(&sql, params![since]).await
    }

    async fn mark_status(&self, id: &str, status: ChangeStatus) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_logs SET status = ? WHERE id = ?",
                [status.as_str(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn list(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM sync_logs ORDER BY seq DESC LIMIT ?");
        self.collect(&sql, params![limit as i64]).await
    }

    async fn count_by_status(&self, status: ChangeStatus) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM sync_logs WHERE status = ?",
                [status.as_str()],
            )
            .await?;

        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
