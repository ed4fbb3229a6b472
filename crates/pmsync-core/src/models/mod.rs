//! Data models for pmsync

mod change;
mod entity;
mod snapshot;
mod watermark;

pub use change::{ChangeRecord, ChangeStatus, ChangeType};
pub use entity::{Entity, EntityKind, Fields, SYSTEM_ACTOR};
pub use snapshot::Snapshot;
pub use watermark::SyncWatermark;
