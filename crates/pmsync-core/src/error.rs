//! Error types for pmsync-core

use thiserror::Error;

use crate::models::EntityKind;

/// Result type alias using pmsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pmsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Presented version does not match the stored one
    #[error("Version conflict on {kind} {id}: expected {expected}, found {actual}")]
    Conflict {
        kind: EntityKind,
        id: String,
        expected: i64,
        actual: i64,
    },

    /// Create with an id already in use
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: EntityKind, id: String },

    /// Entity or change record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity is still referenced by others
    #[error("{kind} {id} is referenced by {count} record(s)")]
    InUse {
        kind: EntityKind,
        id: String,
        count: usize,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Send, receive or connect failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Reconnect attempts exceeded the configured maximum
    #[error("Gave up reconnecting after {attempts} attempt(s)")]
    ExhaustedRetries { attempts: u32 },

    /// Sync session task is no longer running
    #[error("Sync session is not running")]
    SessionClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Errors the caller can recover from by re-reading state and retrying.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Duplicate { .. } | Self::NotFound(_) | Self::InUse { .. }
        )
    }

    /// Errors that indicate the durable store could not complete an operation.
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Database(_) | Self::LibSql(_) | Self::Io(_))
    }

    /// Errors produced by the transport layer.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_versions() {
        let error = Error::Conflict {
            kind: EntityKind::Project,
            id: "P1".to_string(),
            expected: 1,
            actual: 2,
        };
        let message = error.to_string();
        assert!(message.contains("project P1"));
        assert!(message.contains("expected 1"));
        assert!(message.contains("found 2"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn classification_is_disjoint() {
        let transport = Error::Transport("closed".to_string());
        assert!(transport.is_transport());
        assert!(!transport.is_recoverable());
        assert!(!transport.is_storage());

        let storage = Error::Database("disk full".to_string());
        assert!(storage.is_storage());
        assert!(!storage.is_recoverable());
    }
}
