use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::data::CatalogStore;
use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::location::{Location, DEFAULT_LOCATION_ID};
use crate::models::scan::ScanOutcome;
use crate::models::search::{FileOrder, LocationOrder, OrderDirection, SearchCriteria};
use crate::path_scope;
use crate::services::sync_service::{LocationSynchronizer, SyncAllReport, SyncOutcome, SyncReport};
use crate::services::{probe_service, scan_service};

/// The watched locations and everything that adds, re-points or removes one.
pub struct LocationService {
    catalog: Arc<dyn CatalogStore>,
    config: AppConfig,
    locations: Vec<Location>,
}

impl LocationService {
    pub fn new(catalog: Arc<dyn CatalogStore>, config: AppConfig) -> Self {
        Self {
            catalog,
            config,
            locations: Vec::new(),
        }
    }

    /// Loads the watched locations, oldest first.
    pub fn init(&mut self) -> Result<&[Location], AppError> {
        self.locations = self
            .catalog
            .get_watched_directories(LocationOrder::DateAdded, OrderDirection::Asc)?;
        Ok(&self.locations)
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn get(&self, id: Uuid) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    fn position(&self, id: Uuid) -> Result<usize, AppError> {
        self.locations
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| AppError::NotFound(format!("location {id}")))
    }

    fn validate_root(&self, path: &str, ignore: Option<Uuid>) -> Result<String, AppError> {
        if !path_scope::is_absolute(path) {
            return Err(AppError::InvalidLocation(format!(
                "path must be absolute: {path:?}"
            )));
        }
        let path = path_scope::normalize(path);
        for existing in self.locations.iter().filter(|l| Some(l.id) != ignore) {
            if path_scope::normalize(&existing.path) == path {
                return Err(AppError::InvalidLocation(format!(
                    "{path} is already a location"
                )));
            }
            if path_scope::scopes_overlap(&path, &existing.path) {
                return Err(AppError::InvalidLocation(format!(
                    "{path} overlaps the existing location {}",
                    existing.path
                )));
            }
        }
        Ok(path)
    }

    pub fn create(&mut self, path: &str) -> Result<Location, AppError> {
        let path = self.validate_root(path, None)?;
        if !Path::new(&path).is_dir() {
            return Err(AppError::InvalidLocation(format!(
                "{path} is not a directory"
            )));
        }

        let location = Location::new(path);
        self.catalog.create_location(&location)?;
        info!(location = %location.path, id = %location.id, "created location");
        self.locations.push(location.clone());
        Ok(location)
    }

    /// Points the import location at `dir`, creating it on first use.
    pub fn set_default_location(&mut self, dir: &str) -> Result<Location, AppError> {
        if let Ok(pos) = self.position(DEFAULT_LOCATION_ID) {
            let mut location = self.locations[pos].clone();
            location.path = self.validate_root(dir, Some(DEFAULT_LOCATION_ID))?;
            self.catalog.save_location(&location)?;
            self.locations[pos] = location.clone();
            return Ok(location);
        }

        let path = self.validate_root(dir, None)?;
        let location = Location::with_id(DEFAULT_LOCATION_ID, path);
        self.catalog.create_location(&location)?;
        info!(location = %location.path, "created default location");
        self.locations.push(location.clone());
        Ok(location)
    }

    /// Re-points a location, rewriting every file it owns to the same
    /// relative path under `new_path`.
    pub fn change_location_path(&mut self, id: Uuid, new_path: &str) -> Result<Location, AppError> {
        let pos = self.position(id)?;
        let new_path = self.validate_root(new_path, Some(id))?;

        let mut records = self.catalog.search_files(
            &SearchCriteria::LocationEquals(id),
            FileOrder::Id,
            OrderDirection::Asc,
        )?;
        for record in &mut records {
            record.absolute_path = path_scope::join_relative(&new_path, &record.relative_path);
        }

        let mut location = self.locations[pos].clone();
        location.path = new_path;
        self.catalog.rewrite_location(&location, &records)?;
        location.is_broken = !Path::new(&location.path).is_dir();
        info!(location = %location.path, id = %id, "moved location");
        self.locations[pos] = location.clone();
        Ok(location)
    }

    /// Forgets a location and every file record it owns. Files on disk are
    /// left alone.
    pub fn remove(&mut self, id: Uuid) -> Result<(), AppError> {
        if id == DEFAULT_LOCATION_ID {
            return Err(AppError::InvalidLocation(
                "the default location cannot be removed".to_string(),
            ));
        }
        let pos = self.position(id)?;

        let owned: Vec<Uuid> = self
            .catalog
            .search_files(
                &SearchCriteria::LocationEquals(id),
                FileOrder::Id,
                OrderDirection::Asc,
            )?
            .into_iter()
            .map(|f| f.id)
            .collect();
        let removed = self.catalog.remove_files(&owned)?;
        self.catalog.remove_location(id)?;

        let location = self.locations.remove(pos);
        info!(location = %location.path, files = removed, "removed location");
        Ok(())
    }

    /// First import of a freshly created location. Cancelling before the
    /// import is committed removes the location again.
    pub async fn initialize_location<P>(
        &mut self,
        id: Uuid,
        cancel: &AtomicBool,
        on_progress: P,
    ) -> Result<SyncReport, AppError>
    where
        P: FnMut(f64),
    {
        let location = self.locations[self.position(id)?].clone();

        let scan = match scan_service::scan_location_async(
            location.path.clone(),
            self.config.image_extensions.clone(),
        )
        .await?
        {
            ScanOutcome::Found(scan) => scan,
            ScanOutcome::Unreachable { root, reason } => {
                warn!(location = %root, reason = %reason, "cannot read new location");
                return Err(AppError::LocationUnreachable(root));
            }
        };

        let paths: Vec<String> = scan.paths.into_iter().collect();
        let (probed, cancelled) = probe_service::probe_batch(
            paths,
            self.config.probe_concurrency,
            on_progress,
            || cancel.load(Ordering::Relaxed),
        )
        .await;

        let mut report = SyncReport {
            location_id: id,
            outcome: SyncOutcome::Completed,
            created_count: 0,
            removed_count: 0,
            renamed_count: 0,
            recovered_count: 0,
        };

        if cancelled {
            info!(location = %location.path, "import cancelled, removing location");
            self.remove(id)?;
            report.outcome = SyncOutcome::Cancelled;
            return Ok(report);
        }

        let records: Vec<FileRecord> = probed
            .iter()
            .map(|p| FileRecord::from_probe(p, &location))
            .collect();
        report.created_count = self
            .catalog
            .create_files_from_path(&location.path, &records)?;
        info!(
            location = %location.path,
            files = report.created_count,
            "imported location"
        );
        Ok(report)
    }

    /// Catalogues a single file under location `id`. Returns `None` when the
    /// path is already catalogued.
    pub async fn add_file(&self, path: &str, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let location = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("location {id}")))?;
        if !path_scope::is_within_scope(path, &location.path) {
            return Err(AppError::InvalidLocation(format!(
                "{path} is not inside {}",
                location.path
            )));
        }
        let supported = path_scope::extension_lowercase(Path::new(path))
            .map(|ext| self.config.is_supported_extension(&ext))
            .unwrap_or(false);
        if !supported {
            return Err(AppError::General(format!("unsupported file type: {path}")));
        }

        let probed = probe_service::probe_file(path.to_string()).await?;
        let record = FileRecord::from_probe(&probed, location);
        let inserted = self
            .catalog
            .create_files_from_path(&location.path, std::slice::from_ref(&record))?;
        Ok((inserted > 0).then_some(record))
    }

    pub async fn sync_all(
        &mut self,
        synchronizer: &LocationSynchronizer,
        cancel: &AtomicBool,
    ) -> Result<SyncAllReport, AppError> {
        synchronizer.sync_all(&mut self.locations, cancel).await
    }
}
