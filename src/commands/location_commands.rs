use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::data::CatalogStore;
use crate::error::AppError;
use crate::models::location::Location;
use crate::models::search::{FileOrder, OrderDirection, SearchCriteria};
use crate::services::location_service::LocationService;
use crate::services::sync_service::{LocationSynchronizer, SyncAllReport, SyncObserver, SyncReport};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct LocationSummary {
    pub name: String,
    pub location: Location,
    pub file_count: usize,
    pub broken_count: usize,
}

fn location_service(state: &AppState) -> Result<LocationService, AppError> {
    let mut service = LocationService::new(state.catalog.clone(), state.config.clone());
    service.init()?;
    Ok(service)
}

pub async fn add_location(state: &AppState, path: &str) -> Result<SyncReport, AppError> {
    let mut service = location_service(state)?;
    let location = service.create(path)?;

    let cancel = state.reset_cancel_flag();
    let observer = state.observer();
    service
        .initialize_location(location.id, &cancel, |fraction| {
            observer.on_probe_progress(location.id, fraction)
        })
        .await
}

pub fn remove_location(state: &AppState, id: Uuid) -> Result<(), AppError> {
    location_service(state)?.remove(id)
}

pub fn set_default_location(state: &AppState, path: &str) -> Result<Location, AppError> {
    location_service(state)?.set_default_location(path)
}

pub fn move_location(state: &AppState, id: Uuid, new_path: &str) -> Result<Location, AppError> {
    location_service(state)?.change_location_path(id, new_path)
}

pub fn list_locations(state: &AppState) -> Result<Vec<LocationSummary>, AppError> {
    let service = location_service(state)?;
    service
        .locations()
        .iter()
        .map(|location| {
            let files = state.catalog.search_files(
                &SearchCriteria::LocationEquals(location.id),
                FileOrder::Id,
                OrderDirection::Asc,
            )?;
            Ok(LocationSummary {
                name: location.name(),
                location: location.clone(),
                file_count: files.len(),
                broken_count: files.iter().filter(|f| f.is_broken).count(),
            })
        })
        .collect()
}

pub async fn sync_locations(state: &AppState) -> Result<SyncAllReport, AppError> {
    let mut service = location_service(state)?;
    let observer: Arc<dyn SyncObserver> = state.observer();
    let synchronizer = LocationSynchronizer::new(state.catalog.clone(), observer, &state.config);
    let cancel = state.reset_cancel_flag();
    service.sync_all(&synchronizer, &cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::data::SqliteCatalog;
    use crate::services::sync_service::tests::write_image;
    use crate::services::sync_service::SyncOutcome;

    fn test_state() -> AppState {
        AppState::with_catalog(
            AppConfig::default(),
            SqliteCatalog::open_in_memory().unwrap(),
        )
    }

    #[tokio::test]
    async fn add_then_sync_then_list() {
        let state = test_state();
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("a.png"), 3, 3);
        let root = dir.path().to_string_lossy().to_string();

        let report = add_location(&state, &root).await.unwrap();
        assert_eq!(report.created_count, 1);

        write_image(&dir.path().join("b.png"), 4, 4);
        std::fs::remove_file(dir.path().join("a.png")).unwrap();
        let summary = sync_locations(&state).await.unwrap();
        assert_eq!(summary.reports[0].outcome, SyncOutcome::Completed);
        assert_eq!(summary.reports[0].created_count, 1);
        assert_eq!(summary.reports[0].removed_count, 1);

        let listed = list_locations(&state).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, dir.path().file_name().unwrap().to_string_lossy());
        assert_eq!(listed[0].file_count, 2);
        assert_eq!(listed[0].broken_count, 1);
        assert_eq!(state.sync_snapshot().status, "idle");
    }

    #[tokio::test]
    async fn remove_forgets_location() {
        let state = test_state();
        let dir = tempfile::tempdir().unwrap();
        let report = add_location(&state, &dir.path().to_string_lossy())
            .await
            .unwrap();

        remove_location(&state, report.location_id).unwrap();
        assert!(list_locations(&state).unwrap().is_empty());
    }
}
