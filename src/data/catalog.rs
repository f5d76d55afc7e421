use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use crate::data::{migrations, repository};
use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::location::Location;
use crate::models::search::{FileOrder, LocationOrder, OrderDirection, SearchCriteria};
use crate::path_scope;

/// The narrow contract the synchronizer and location service persist through.
/// Every call either succeeds or returns the failure; nothing is dropped.
pub trait CatalogStore: Send + Sync {
    fn create_location(&self, location: &Location) -> Result<(), AppError>;

    fn save_location(&self, location: &Location) -> Result<(), AppError>;

    fn remove_location(&self, id: Uuid) -> Result<(), AppError>;

    fn get_watched_directories(
        &self,
        order_by: LocationOrder,
        order: OrderDirection,
    ) -> Result<Vec<Location>, AppError>;

    fn search_files(
        &self,
        criteria: &SearchCriteria,
        order_by: FileOrder,
        order: OrderDirection,
    ) -> Result<Vec<FileRecord>, AppError>;

    /// Inserts the records that belong under `location_path` and are not yet
    /// catalogued. Returns how many were written.
    fn create_files_from_path(
        &self,
        location_path: &str,
        files: &[FileRecord],
    ) -> Result<usize, AppError>;

    /// Full replace keyed by the record's id.
    fn save_file(&self, file: &FileRecord) -> Result<(), AppError>;

    fn remove_files(&self, ids: &[Uuid]) -> Result<usize, AppError>;

    /// Saves a re-pointed location together with its rewritten records.
    /// Either all of them are written or none.
    fn rewrite_location(&self, location: &Location, files: &[FileRecord]) -> Result<(), AppError>;
}

pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CatalogStore for SqliteCatalog {
    fn create_location(&self, location: &Location) -> Result<(), AppError> {
        repository::insert_location(&self.conn(), location)
    }

    fn save_location(&self, location: &Location) -> Result<(), AppError> {
        let updated = repository::update_location(&self.conn(), location)?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("location {}", location.id)));
        }
        Ok(())
    }

    fn remove_location(&self, id: Uuid) -> Result<(), AppError> {
        repository::delete_location(&self.conn(), id)?;
        Ok(())
    }

    fn get_watched_directories(
        &self,
        order_by: LocationOrder,
        order: OrderDirection,
    ) -> Result<Vec<Location>, AppError> {
        repository::list_locations(&self.conn(), order_by, order)
    }

    fn search_files(
        &self,
        criteria: &SearchCriteria,
        order_by: FileOrder,
        order: OrderDirection,
    ) -> Result<Vec<FileRecord>, AppError> {
        repository::search_files(&self.conn(), criteria, order_by, order)
    }

    fn create_files_from_path(
        &self,
        location_path: &str,
        files: &[FileRecord],
    ) -> Result<usize, AppError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for file in files {
            if !path_scope::is_within_scope(&file.absolute_path, location_path) {
                warn!(
                    path = %file.absolute_path,
                    location = %location_path,
                    "skipping file outside of its location"
                );
                continue;
            }
            if repository::insert_file_if_absent(&tx, file)? {
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn save_file(&self, file: &FileRecord) -> Result<(), AppError> {
        repository::upsert_file(&self.conn(), file)
    }

    fn remove_files(&self, ids: &[Uuid]) -> Result<usize, AppError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = repository::delete_files(&tx, ids)?;
        tx.commit()?;
        Ok(removed)
    }

    fn rewrite_location(
        &self,
        location: &Location,
        files: &[FileRecord],
    ) -> Result<(), AppError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if repository::update_location(&tx, location)? == 0 {
            return Err(AppError::NotFound(format!("location {}", location.id)));
        }
        for file in files {
            repository::upsert_file(&tx, file)?;
        }
        tx.commit()?;
        Ok(())
    }
}
