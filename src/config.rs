use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const DEFAULT_THUMBNAIL_ENCODING: &str = "jpg";
const DEFAULT_THUMBNAIL_SIZE: u32 = 256;
// Loading metadata is mostly waiting on the disk, so this can be generous.
const DEFAULT_PROBE_CONCURRENCY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub image_extensions: Vec<String>,
    pub thumbnail_encoding: String,
    pub thumbnail_size: u32,
    pub probe_concurrency: usize,
    pub thumbnail_dir: PathBuf,
    pub database_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            thumbnail_encoding: DEFAULT_THUMBNAIL_ENCODING.to_string(),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            thumbnail_dir: data_dir.join("thumbnails"),
            database_path: data_dir.join("gallery-sync.db"),
        }
    }
}

impl AppConfig {
    /// Reads the config at `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        Ok(config.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("gallery-sync.json"))
    }

    pub fn normalized(mut self) -> Self {
        self.image_extensions = self
            .image_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.image_extensions.sort();
        self.image_extensions.dedup();
        self.thumbnail_encoding = self
            .thumbnail_encoding
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        self.probe_concurrency = self.probe_concurrency.max(1);
        self.thumbnail_size = self.thumbnail_size.max(1);
        self
    }

    pub fn is_supported_extension(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.image_extensions.iter().any(|e| *e == extension)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gallery-sync")
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("gallery-sync"))
}
