//! Database layer for pmsync

mod change_log_repository;
mod connection;
mod entity_repository;
mod migrations;
mod watermark_repository;

pub use change_log_repository::{ChangeLogRepository, LibSqlChangeLogRepository};
pub use connection::Database;
pub use entity_repository::{EntityRepository, LibSqlEntityRepository};
pub use watermark_repository::{LibSqlWatermarkRepository, WatermarkRepository};
