//! Backup snapshot model

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityKind};

/// Full copy of the local replica, used for backup and restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub projects: Vec<Entity>,
    #[serde(default)]
    pub companies: Vec<Entity>,
    #[serde(default)]
    pub export_time: String,
}

impl Snapshot {
    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        match kind {
            EntityKind::Project => &self.projects,
            EntityKind::Company => &self.companies,
        }
    }

    pub fn len(&self) -> usize {
        self.projects.len() + self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
