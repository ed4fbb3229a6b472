//! Change log model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityKind, SYSTEM_ACTOR};
use crate::error::{Error, Result};

/// Kind of accepted mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Past-tense verb used in notifications
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown change type: {other}"))),
        }
    }
}

/// Delivery status of a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    #[default]
    Pending,
    Synced,
}

impl ChangeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            other => Err(Error::InvalidInput(format!("unknown change status: {other}"))),
        }
    }
}

fn system_actor() -> String {
    SYSTEM_ACTOR.to_string()
}

/// Immutable log entry for one accepted mutation. Only `status` ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub entity: EntityKind,
    pub entity_id: String,
    /// Snapshot after the change; absent for deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Entity>,
    /// Unix milliseconds, the sync watermark unit
    pub timestamp: i64,
    #[serde(default = "system_actor")]
    pub user_id: String,
    #[serde(default)]
    pub status: ChangeStatus,
}

impl ChangeRecord {
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, ChangeStatus::Pending)
    }

    /// Label for notifications: entity name when the snapshot has one, else the id.
    pub fn label(&self) -> String {
        self.data
            .as_ref()
            .and_then(|entity| entity.field_text("name"))
            .unwrap_or_else(|| self.entity_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let record = ChangeRecord {
            id: "c1".to_string(),
            change_type: ChangeType::Delete,
            entity: EntityKind::Company,
            entity_id: "C1".to_string(),
            data: None,
            timestamp: 42,
            user_id: "alice".to_string(),
            status: ChangeStatus::Pending,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "c1",
                "type": "delete",
                "entity": "company",
                "entityId": "C1",
                "timestamp": 42,
                "userId": "alice",
                "status": "pending"
            })
        );
    }

    #[test]
    fn test_parse_without_optional_fields() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "id": "c2",
            "type": "create",
            "entity": "project",
            "entityId": "P1",
            "data": {"id": "P1", "name": "Bridge"},
            "timestamp": 7
        }))
        .unwrap();

        assert!(record.is_pending());
        assert_eq!(record.user_id, SYSTEM_ACTOR);
        assert_eq!(record.label(), "Bridge");
        assert_eq!(record.data.unwrap().version, 1);
    }

    #[test]
    fn test_status_round_trip_through_text() {
        for status in [ChangeStatus::Pending, ChangeStatus::Synced] {
            assert_eq!(status.as_str().parse::<ChangeStatus>().unwrap(), status);
        }
        assert!("lost".parse::<ChangeStatus>().is_err());
    }
}
