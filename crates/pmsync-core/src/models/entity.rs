//! Versioned business records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Acting user recorded when no user context exists.
pub const SYSTEM_ACTOR: &str = "system";

/// Open set of named business fields carried by an entity.
pub type Fields = Map<String, Value>;

/// Keys managed by the store; patches and imported bodies never set them directly.
const RESERVED_KEYS: [&str; 6] = [
    "id",
    "version",
    "createdBy",
    "updatedBy",
    "createdAt",
    "updatedAt",
];

/// Kind of synchronized record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Company,
}

impl EntityKind {
    pub const ALL: [Self; 2] = [Self::Project, Self::Company];

    /// Name used on the wire and in change records
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Company => "company",
        }
    }

    /// Backing collection name
    pub const fn table(self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Company => "companies",
        }
    }

    /// Field used for the non-unique secondary lookup
    pub const fn lookup_field(self) -> &'static str {
        match self {
            Self::Project => "companyId",
            Self::Company => "name",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" | "projects" => Ok(Self::Project),
            "company" | "companies" => Ok(Self::Company),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {other}"))),
        }
    }
}

const fn first_version() -> i64 {
    1
}

fn system_actor() -> String {
    SYSTEM_ACTOR.to_string()
}

/// A project or company record with optimistic-concurrency metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Creator-assigned identifier, unique per kind
    pub id: String,
    /// Starts at 1, bumped by exactly one on every accepted update
    #[serde(default = "first_version")]
    pub version: i64,
    #[serde(default = "system_actor")]
    pub created_by: String,
    #[serde(default = "system_actor")]
    pub updated_by: String,
    /// RFC 3339 UTC text
    #[serde(default)]
    pub created_at: String,
    /// RFC 3339 UTC text
    #[serde(default)]
    pub updated_at: String,
    /// Business fields (name, companyId, amounts, dates, ...)
    #[serde(flatten)]
    pub fields: Fields,
}

impl Entity {
    /// Build a first-version entity from raw fields.
    ///
    /// The `id` is taken from the fields; reserved metadata keys in the input are ignored.
    pub fn from_fields(mut fields: Fields, actor: &str, now: &str) -> Result<Self> {
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id.trim().to_string(),
            Some(Value::Number(id)) => id.to_string(),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "entity id must be a string, got {other}"
                )))
            }
            None => String::new(),
        };
        if id.is_empty() {
            return Err(Error::InvalidInput("entity id is required".into()));
        }
        strip_reserved(&mut fields);

        Ok(Self {
            id,
            version: first_version(),
            created_by: actor.to_string(),
            updated_by: actor.to_string(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
            fields,
        })
    }

    /// Shallow-merge `patch` over the business fields. Reserved keys are skipped.
    pub fn merge_fields(&mut self, patch: Fields) {
        for (key, value) in patch {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    /// Next version of this entity after an accepted update.
    #[must_use]
    pub fn next_revision(&self, patch: Fields, actor: &str, now: &str) -> Self {
        let mut next = self.clone();
        next.merge_fields(patch);
        next.version = self.version + 1;
        next.updated_by = actor.to_string();
        next.updated_at = now.to_string();
        next
    }

    /// String value of a business field, numbers rendered as text.
    pub fn field_text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Value of the kind's secondary lookup field, if set.
    pub fn lookup_value(&self, kind: EntityKind) -> Option<String> {
        self.field_text(kind.lookup_field())
    }

    /// Human-readable label: the `name` field, falling back to the id.
    pub fn label(&self) -> String {
        self.field_text("name").unwrap_or_else(|| self.id.clone())
    }
}

fn strip_reserved(fields: &mut Fields) {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
}
