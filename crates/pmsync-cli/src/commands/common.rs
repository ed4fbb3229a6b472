use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pmsync_core::{
    Actor, ChangeRecord, ChangeRecorder, Entity, Fields, LocalStore, VersionGuard,
};
use serde_json::Value;
use tokio::sync::Notify;

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub async fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path).await?)
}

/// Resolve the active profile (or an empty one when none is saved).
pub fn load_profile(profile_name: Option<&str>) -> Result<(String, CliProfile), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&name).cloned().unwrap_or_default();
    Ok((name, profile))
}

/// A write path for one-shot commands; nothing listens on the wake signal.
pub async fn open_guard(
    db_path: &Path,
    profile: &CliProfile,
) -> Result<VersionGuard, CliError> {
    let store = open_store(db_path).await?;
    let recorder = ChangeRecorder::new(Actor::new(profile.user_id()), Arc::new(Notify::new()));
    Ok(VersionGuard::new(store, recorder))
}

/// Build a field map from an optional JSON object followed by `key=value` assignments.
pub fn parse_fields(json: Option<&str>, assignments: &[String]) -> Result<Fields, CliError> {
    let mut fields = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            other => {
                return Err(CliError::InvalidField(format!(
                    "expected a JSON object, got {other}"
                )))
            }
        },
        None => Fields::new(),
    };

    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        fields.insert(key, value);
    }

    Ok(fields)
}

/// `key=value`; the value is parsed as JSON when it can be, else kept as a string.
pub fn parse_assignment(assignment: &str) -> Result<(String, Value), CliError> {
    let Some((key, raw_value)) = assignment.split_once('=') else {
        return Err(CliError::InvalidField(assignment.to_string()));
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::InvalidField(assignment.to_string()));
    }

    let value = serde_json::from_str::<Value>(raw_value)
        .unwrap_or_else(|_| Value::String(raw_value.to_string()));
    Ok((key.to_string(), value))
}

pub fn format_entity_lines(entities: &[Entity]) -> Vec<String> {
    entities
        .iter()
        .map(|entity| {
            let label = truncate(&entity.label(), 32);
            format!(
                "{:<20}  {label:<32}  v{:<4}  {}",
                truncate(&entity.id, 20),
                entity.version,
                entity.updated_by
            )
        })
        .collect()
}

pub fn format_change_lines(changes: &[ChangeRecord]) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            format!(
                "{}  {:<8}  {:<6}  {:<7}  {:<20}  {}",
                format_timestamp(change.timestamp),
                change.status,
                change.change_type,
                change.entity,
                truncate(&change.entity_id, 20),
                change.user_id
            )
        })
        .collect()
}

/// Millisecond epoch as RFC 3339, or the raw number when out of range.
pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map_or_else(|| timestamp_ms.to_string(), |time| time.to_rfc3339())
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = value.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
