//! Messages exchanged with the sync peer.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ChangeRecord;

/// One protocol message, encoded as a JSON object tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Ask the peer for changes at or after `last_sync_time`
    #[serde(rename_all = "camelCase")]
    SyncRequest {
        id: String,
        last_sync_time: i64,
        timestamp: i64,
    },
    /// Answer to a `sync_request`
    #[serde(rename_all = "camelCase")]
    SyncResponse {
        request_id: String,
        #[serde(default)]
        changes: Vec<ChangeRecord>,
        timestamp: i64,
    },
    /// A single change pushed as it happens
    DataChange { change: ChangeRecord },
    Heartbeat { timestamp: i64 },
}

impl WireMessage {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SyncRequest { .. } => "sync_request",
            Self::SyncResponse { .. } => "sync_response",
            Self::DataChange { .. } => "data_change",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
