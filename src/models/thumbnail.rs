use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRequest {
    pub source_path: String,
    pub file_id: Uuid,
    pub thumbnail_directory: String,
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThumbnailResponse {
    Generated { file_id: Uuid, thumbnail_path: String },
    Failed { file_id: Uuid, error: String },
}

impl ThumbnailResponse {
    pub fn file_id(&self) -> Uuid {
        match self {
            Self::Generated { file_id, .. } | Self::Failed { file_id, .. } => *file_id,
        }
    }

    /// The path a viewer should render. A failed generation falls back to the
    /// source image so there is always something to show.
    pub fn display_path(&self, source_path: &str) -> String {
        match self {
            Self::Generated { thumbnail_path, .. } => thumbnail_path.clone(),
            Self::Failed { .. } => source_path.to_string(),
        }
    }
}
