//! Sync watermark model

use serde::{Deserialize, Serialize};

/// Outcome of the last successful pull, bounding the next `sync_request`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    /// Peer timestamp (Unix ms) of the last applied `sync_response`
    pub last_sync_time: i64,
    pub success: bool,
    pub changes_applied: u64,
}

impl SyncWatermark {
    /// Watermark after applying `changes_applied` remote changes stamped `timestamp`.
    pub const fn advanced(timestamp: i64, changes_applied: u64) -> Self {
        Self {
            last_sync_time: timestamp,
            success: true,
            changes_applied,
        }
    }
}
