use std::path::Path;

use pmsync_core::{Entity, EntityKind};
use serde_json::Value;

use crate::cli::EntityCommands;
use crate::commands::common::{format_entity_lines, load_profile, open_guard, parse_fields};
use crate::error::CliError;

pub async fn run_entity(
    kind: EntityKind,
    command: EntityCommands,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        EntityCommands::Create { id, fields, json } => {
            run_create(kind, &id, json.as_deref(), &fields, profile_name, db_path).await
        }
        EntityCommands::Update {
            id,
            version,
            fields,
            json,
        } => {
            run_update(
                kind,
                &id,
                version,
                json.as_deref(),
                &fields,
                profile_name,
                db_path,
            )
            .await
        }
        EntityCommands::Delete { id, version } => {
            run_delete(kind, &id, version, profile_name, db_path).await
        }
        EntityCommands::Show { id } => run_show(kind, &id, profile_name, db_path).await,
        EntityCommands::List { lookup, json } => {
            run_list(kind, lookup.as_deref(), json, profile_name, db_path).await
        }
    }
}

pub async fn run_create(
    kind: EntityKind,
    id: &str,
    json: Option<&str>,
    assignments: &[String],
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let mut fields = parse_fields(json, assignments)?;
    fields.insert("id".to_string(), Value::String(id.trim().to_string()));

    let (_, profile) = load_profile(profile_name)?;
    let guard = open_guard(db_path, &profile).await?;
    let entity = guard.create(kind, fields).await?;

    println!("{} v{}", entity.id, entity.version);
    Ok(())
}

pub async fn run_update(
    kind: EntityKind,
    id: &str,
    version: i64,
    json: Option<&str>,
    assignments: &[String],
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let patch = parse_fields(json, assignments)?;
    if patch.is_empty() {
        return Err(CliError::EmptyPatch);
    }

    let (_, profile) = load_profile(profile_name)?;
    let guard = open_guard(db_path, &profile).await?;
    let entity = guard.update(kind, id.trim(), patch, version).await?;

    println!("{} v{}", entity.id, entity.version);
    Ok(())
}

pub async fn run_delete(
    kind: EntityKind,
    id: &str,
    version: i64,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let (_, profile) = load_profile(profile_name)?;
    let guard = open_guard(db_path, &profile).await?;
    guard.delete(kind, id.trim(), version).await?;

    println!("{}", id.trim());
    Ok(())
}

pub async fn run_show(
    kind: EntityKind,
    id: &str,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let (_, profile) = load_profile(profile_name)?;
    let guard = open_guard(db_path, &profile).await?;
    let entity = guard.get(kind, id.trim()).await?;

    println!("{}", serde_json::to_string_pretty(&entity)?);
    Ok(())
}

pub async fn run_list(
    kind: EntityKind,
    lookup: Option<&str>,
    as_json: bool,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let entities = list_entities(kind, lookup, profile_name, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        for line in format_entity_lines(&entities) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn list_entities(
    kind: EntityKind,
    lookup: Option<&str>,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<Vec<Entity>, CliError> {
    let (_, profile) = load_profile(profile_name)?;
    let guard = open_guard(db_path, &profile).await?;

    match lookup.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => {
            let mut entities = guard.store().list_by_lookup(kind, value).await?;
            entities.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(entities)
        }
        None => Ok(guard.list(kind).await?),
    }
}
