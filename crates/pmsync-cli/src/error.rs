use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pmsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid field assignment: {0}")]
    InvalidField(String),
    #[error("No fields provided")]
    EmptyPatch,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `pmsync config init --user <id> --websocket-url <url>` (or --events-url/--api-base-url)."
    )]
    SyncNotConfigured,
}
