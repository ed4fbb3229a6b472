//! Sync watermark repository implementation

use crate::error::Result;
use crate::models::SyncWatermark;
use libsql::Connection;

const WATERMARK_KEY: &str = "sync_status";

/// Trait for watermark storage operations (async)
#[allow(async_fn_in_trait)]
pub trait WatermarkRepository {
    /// Load the watermark, or the zero watermark when none was saved
    async fn load(&self) -> Result<SyncWatermark>;

    /// Replace the stored watermark
    async fn save(&self, watermark: &SyncWatermark) -> Result<()>;
}

/// libSQL implementation of `WatermarkRepository`
pub struct LibSqlWatermarkRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlWatermarkRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl WatermarkRepository for LibSqlWatermarkRepository<'_> {
    async fn load(&self) -> Result<SyncWatermark> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [WATERMARK_KEY])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(serde_json::from_str(&value)?)
        } else {
            Ok(SyncWatermark::default())
        }
    }

    async fn save(&self, watermark: &SyncWatermark) -> Result<()> {
        let value = serde_json::to_string(watermark)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [WATERMARK_KEY, value.as_str()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_default_watermark() {
        let db = setup().await;
        let repo = LibSqlWatermarkRepository::new(db.connection());

        let watermark = repo.load().await.unwrap();
        assert_eq!(watermark.last_sync_time, 0);
        assert!(!watermark.success);
        assert_eq!(watermark.changes_applied, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_load_watermark() {
        let db = setup().await;
        let repo = LibSqlWatermarkRepository::new(db.connection());

        repo.save(&SyncWatermark::advanced(1_700_000_000_000, 3))
            .await
            .unwrap();
        repo.save(&SyncWatermark::advanced(1_700_000_000_500, 1))
            .await
            .unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, SyncWatermark::advanced(1_700_000_000_500, 1));
    }
}
