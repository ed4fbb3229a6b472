use std::path::Path;

use pmsync_core::ChangeRecord;

use crate::commands::common::{format_change_lines, open_store};
use crate::error::CliError;

pub async fn run_changes(
    limit: usize,
    pending_only: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let changes = list_changes(limit, pending_only, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else {
        for line in format_change_lines(&changes) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Most recent records first; `pending_only` returns undelivered ones oldest first.
pub async fn list_changes(
    limit: usize,
    pending_only: bool,
    db_path: &Path,
) -> Result<Vec<ChangeRecord>, CliError> {
    let store = open_store(db_path).await?;

    if pending_only {
        let mut pending = store.changes_since(0).await?;
        pending.truncate(limit);
        Ok(pending)
    } else {
        Ok(store.recent_changes(limit).await?)
    }
}
