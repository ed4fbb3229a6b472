use std::path::Path;

use pmsync_core::{ChangeStatus, EntityKind, SyncWatermark};
use serde::Serialize;

use crate::commands::common::{format_timestamp, open_store};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub projects: usize,
    pub companies: usize,
    pub pending_changes: usize,
    pub synced_changes: usize,
    pub watermark: SyncWatermark,
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let report = collect_status(db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Projects:        {}", report.projects);
    println!("Companies:       {}", report.companies);
    println!("Pending changes: {}", report.pending_changes);
    println!("Synced changes:  {}", report.synced_changes);
    if report.watermark.last_sync_time > 0 {
        println!(
            "Last sync:       {} ({} change(s) applied)",
            format_timestamp(report.watermark.last_sync_time),
            report.watermark.changes_applied
        );
    } else {
        println!("Last sync:       never");
    }

    Ok(())
}

pub async fn collect_status(db_path: &Path) -> Result<StatusReport, CliError> {
    let store = open_store(db_path).await?;

    Ok(StatusReport {
        projects: store.list_all(EntityKind::Project).await?.len(),
        companies: store.list_all(EntityKind::Company).await?.len(),
        pending_changes: store.count_changes(ChangeStatus::Pending).await?,
        synced_changes: store.count_changes(ChangeStatus::Synced).await?,
        watermark: store.load_watermark().await?,
    })
}
