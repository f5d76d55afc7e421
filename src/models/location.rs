use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path_scope;

/// The import location files are downloaded into. It can be re-pointed but
/// never removed.
pub const DEFAULT_LOCATION_ID: Uuid = Uuid::from_u128(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub path: String,
    pub date_added: DateTime<Utc>,
    pub tags_to_add: BTreeSet<Uuid>,
    /// Derived from the last scan, never persisted.
    #[serde(skip)]
    pub is_broken: bool,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), path)
    }

    pub fn with_id(id: Uuid, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            date_added: Utc::now(),
            tags_to_add: BTreeSet::new(),
            is_broken: false,
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_LOCATION_ID
    }

    pub fn name(&self) -> String {
        path_scope::file_name(&path_scope::normalize(&self.path))
    }
}
