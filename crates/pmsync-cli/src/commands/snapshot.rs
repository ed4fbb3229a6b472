use std::path::Path;

use pmsync_core::Snapshot;

use crate::commands::common::{load_profile, open_guard, open_store};
use crate::error::CliError;

pub async fn run_export(output_path: Option<&Path>, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let snapshot = store.export_snapshot().await?;
    let rendered = serde_json::to_string_pretty(&snapshot)?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

pub async fn run_import(
    snapshot_path: &Path,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(snapshot_path)?;
    let snapshot = serde_json::from_str::<Snapshot>(&raw)?;

    let (_, profile) = load_profile(profile_name)?;
    let guard = open_guard(db_path, &profile).await?;
    let imported = guard.import_snapshot(&snapshot).await?;

    println!(
        "Imported {imported} record(s) ({} project(s), {} company(ies))",
        snapshot.projects.len(),
        snapshot.companies.len()
    );
    Ok(())
}
