use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;
use crate::path_scope;

/// Intrinsic attributes read from a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub date_created: Option<DateTime<Utc>>,
    pub date_modified: DateTime<Utc>,
}

/// A newly discovered path together with its probed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbedFile {
    pub path: String,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub absolute_path: String,
    /// `absolute_path` with the owning location's root stripped.
    pub relative_path: String,
    pub location_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub tags: BTreeSet<Uuid>,
    pub thumbnail_path: Option<String>,
    pub is_broken: bool,
}

impl FileRecord {
    pub fn from_probe(probed: &ProbedFile, location: &Location) -> Self {
        Self {
            id: Uuid::new_v4(),
            absolute_path: probed.path.clone(),
            relative_path: path_scope::relative_to_root(&probed.path, &location.path),
            location_id: location.id,
            width: probed.metadata.width,
            height: probed.metadata.height,
            size: probed.metadata.size,
            date_added: Utc::now(),
            date_modified: probed.metadata.date_modified,
            tags: location.tags_to_add.clone(),
            thumbnail_path: None,
            is_broken: false,
        }
    }

    pub fn name(&self) -> String {
        path_scope::file_name(&self.absolute_path)
    }

    pub fn has_same_characteristics(&self, metadata: &FileMetadata) -> bool {
        self.width == metadata.width && self.height == metadata.height && self.size == metadata.size
    }

    /// Points the record at a new file inside `location_root`. Identity and
    /// tags are kept; the cached thumbnail belongs to the old path.
    pub fn move_to(&mut self, absolute_path: &str, location_root: &str) {
        self.absolute_path = absolute_path.to_string();
        self.relative_path = path_scope::relative_to_root(absolute_path, location_root);
        self.thumbnail_path = None;
        self.is_broken = false;
    }
}
