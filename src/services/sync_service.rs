use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::data::CatalogStore;
use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::location::Location;
use crate::models::scan::ScanOutcome;
use crate::models::search::{FileOrder, OrderDirection, SearchCriteria};
use crate::services::rename_service::RenameMatches;
use crate::services::{probe_service, reconcile_service, rename_service, scan_service};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Scanning,
    Reconciling,
    ProbingMetadata,
    Committing,
    Broken,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    Broken,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub location_id: Uuid,
    pub outcome: SyncOutcome,
    pub created_count: usize,
    pub removed_count: usize,
    pub renamed_count: usize,
    pub recovered_count: usize,
}

impl SyncReport {
    fn new(location_id: Uuid, outcome: SyncOutcome) -> Self {
        Self {
            location_id,
            outcome,
            created_count: 0,
            removed_count: 0,
            renamed_count: 0,
            recovered_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncAllReport {
    pub reports: Vec<SyncReport>,
    /// Whether any location gained a file, i.e. views listing files are stale.
    pub found_new_files: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LocationUnreachable { location_id: Uuid, path: String },
    NewFilesDetected { count: usize },
    FilesMissing { location_id: Uuid, count: usize },
}

/// Receives the synchronizer's state transitions. All methods default to
/// doing nothing.
pub trait SyncObserver: Send + Sync {
    fn on_phase(&self, _location_id: Uuid, _phase: SyncPhase) {}

    /// `index` is 1-based.
    fn on_location_progress(&self, _index: usize, _total: usize) {}

    fn on_probe_progress(&self, _location_id: Uuid, _fraction: f64) {}

    fn notify(&self, _notice: Notice) {}
}

pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Brings the catalog of each location in line with its directory on disk.
pub struct LocationSynchronizer {
    catalog: Arc<dyn CatalogStore>,
    observer: Arc<dyn SyncObserver>,
    extensions: Vec<String>,
    probe_concurrency: usize,
}

impl LocationSynchronizer {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        observer: Arc<dyn SyncObserver>,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog,
            observer,
            extensions: config.image_extensions.clone(),
            probe_concurrency: config.probe_concurrency.max(1),
        }
    }

    /// Synchronizes locations one after another. Cancellation is checked
    /// before each location; a cancelled location still commits what it
    /// probed. Catalog failures abort the whole run.
    pub async fn sync_all(
        &self,
        locations: &mut [Location],
        cancel: &AtomicBool,
    ) -> Result<SyncAllReport, AppError> {
        let total = locations.len();
        let mut summary = SyncAllReport::default();

        for (i, location) in locations.iter_mut().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            self.observer.on_location_progress(i + 1, total);

            let report = self.sync_one(location, cancel).await?;
            summary.found_new_files |= report.created_count > 0;
            summary.cancelled |= report.outcome == SyncOutcome::Cancelled;
            summary.reports.push(report);
        }

        if summary.found_new_files {
            let count = summary.reports.iter().map(|r| r.created_count).sum();
            self.observer.notify(Notice::NewFilesDetected { count });
        }
        Ok(summary)
    }

    pub async fn sync_one(
        &self,
        location: &mut Location,
        cancel: &AtomicBool,
    ) -> Result<SyncReport, AppError> {
        let id = location.id;

        self.observer.on_phase(id, SyncPhase::Scanning);
        let scan =
            match scan_service::scan_location_async(location.path.clone(), self.extensions.clone())
                .await?
            {
                ScanOutcome::Found(scan) => scan,
                ScanOutcome::Unreachable { root, reason } => {
                    warn!(location = %root, reason = %reason, "cannot find location");
                    location.is_broken = true;
                    self.observer.on_phase(id, SyncPhase::Broken);
                    self.observer.notify(Notice::LocationUnreachable {
                        location_id: id,
                        path: root,
                    });
                    return Ok(SyncReport::new(id, SyncOutcome::Broken));
                }
            };
        location.is_broken = false;

        self.observer.on_phase(id, SyncPhase::Reconciling);
        let records = self.catalog.search_files(
            &SearchCriteria::LocationEquals(id),
            FileOrder::Id,
            OrderDirection::Asc,
        )?;
        let reconciliation = reconcile_service::diff(&scan.paths, records);
        debug!(
            location = %location.path,
            created = reconciliation.created.len(),
            missing = reconciliation.missing.len(),
            "reconciled location"
        );

        self.observer.on_phase(id, SyncPhase::ProbingMetadata);
        let created: Vec<String> = reconciliation.created.into_iter().collect();
        let (probed, cancelled) = probe_service::probe_batch(
            created,
            self.probe_concurrency,
            |fraction| self.observer.on_probe_progress(id, fraction),
            || cancel.load(Ordering::Relaxed),
        )
        .await;

        let matches = rename_service::match_renames(reconciliation.missing, probed);

        self.observer.on_phase(id, SyncPhase::Committing);
        let outcome = if cancelled {
            SyncOutcome::Cancelled
        } else {
            SyncOutcome::Completed
        };
        let report = self.commit(location, reconciliation.existing, matches, outcome)?;

        info!(
            location = %location.path,
            created = report.created_count,
            renamed = report.renamed_count,
            removed = report.removed_count,
            recovered = report.recovered_count,
            "synchronized location"
        );
        self.observer.on_phase(
            id,
            if cancelled {
                SyncPhase::Cancelled
            } else {
                SyncPhase::Idle
            },
        );
        Ok(report)
    }

    fn commit(
        &self,
        location: &Location,
        existing: Vec<FileRecord>,
        matches: RenameMatches,
        outcome: SyncOutcome,
    ) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::new(location.id, outcome);

        for mut record in existing.into_iter().filter(|r| r.is_broken) {
            record.is_broken = false;
            self.catalog.save_file(&record)?;
            report.recovered_count += 1;
        }

        let mut newly_broken = 0;
        for (mut record, found) in matches.pairs {
            match found {
                Some(file) => {
                    let stale_thumbnail = record
                        .thumbnail_path
                        .take()
                        .filter(|thumb| *thumb != record.absolute_path);
                    debug!(
                        file = %record.name(),
                        from = %record.absolute_path,
                        to = %file.path,
                        "file was moved, keeping its catalog entry"
                    );
                    record.move_to(&file.path, &location.path);
                    record.date_modified = file.metadata.date_modified;
                    self.catalog.save_file(&record)?;
                    report.renamed_count += 1;

                    if let Some(thumb) = stale_thumbnail {
                        if let Err(e) = fs::remove_file(&thumb) {
                            debug!(path = %thumb, error = %e, "could not remove stale thumbnail");
                        }
                    }
                }
                // Matching was incomplete, so absence proves nothing yet.
                None if outcome == SyncOutcome::Cancelled => {}
                None => {
                    report.removed_count += 1;
                    if !record.is_broken {
                        record.is_broken = true;
                        self.catalog.save_file(&record)?;
                        newly_broken += 1;
                    }
                }
            }
        }

        let new_records: Vec<FileRecord> = matches
            .unmatched_created
            .iter()
            .map(|probed| FileRecord::from_probe(probed, location))
            .collect();
        report.created_count = self
            .catalog
            .create_files_from_path(&location.path, &new_records)?;

        if newly_broken > 0 {
            warn!(
                location = %location.path,
                count = newly_broken,
                "files went missing; they are kept as broken until removed"
            );
            self.observer.notify(Notice::FilesMissing {
                location_id: location.id,
                count: newly_broken,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::SqliteCatalog;
    use crate::models::search::LocationOrder;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub phases: Mutex<Vec<SyncPhase>>,
        pub notices: Mutex<Vec<Notice>>,
        pub location_progress: Mutex<Vec<(usize, usize)>>,
        pub probe_progress: Mutex<Vec<f64>>,
    }

    impl SyncObserver for RecordingObserver {
        fn on_phase(&self, _location_id: Uuid, phase: SyncPhase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn on_location_progress(&self, index: usize, total: usize) {
            self.location_progress.lock().unwrap().push((index, total));
        }

        fn on_probe_progress(&self, _location_id: Uuid, fraction: f64) {
            self.probe_progress.lock().unwrap().push(fraction);
        }

        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    /// Delegates reads and fails every write.
    pub(crate) struct ReadOnlyCatalog(pub SqliteCatalog);

    impl CatalogStore for ReadOnlyCatalog {
        fn create_location(&self, location: &Location) -> Result<(), AppError> {
            self.0.create_location(location)
        }

        fn save_location(&self, _location: &Location) -> Result<(), AppError> {
            Err(AppError::General("disk full".to_string()))
        }

        fn remove_location(&self, _id: Uuid) -> Result<(), AppError> {
            Err(AppError::General("disk full".to_string()))
        }

        fn get_watched_directories(
            &self,
            order_by: LocationOrder,
            order: OrderDirection,
        ) -> Result<Vec<Location>, AppError> {
            self.0.get_watched_directories(order_by, order)
        }

        fn search_files(
            &self,
            criteria: &SearchCriteria,
            order_by: FileOrder,
            order: OrderDirection,
        ) -> Result<Vec<FileRecord>, AppError> {
            self.0.search_files(criteria, order_by, order)
        }

        fn create_files_from_path(
            &self,
            _location_path: &str,
            _files: &[FileRecord],
        ) -> Result<usize, AppError> {
            Err(AppError::General("disk full".to_string()))
        }

        fn save_file(&self, _file: &FileRecord) -> Result<(), AppError> {
            Err(AppError::General("disk full".to_string()))
        }

        fn remove_files(&self, _ids: &[Uuid]) -> Result<usize, AppError> {
            Err(AppError::General("disk full".to_string()))
        }

        fn rewrite_location(
            &self,
            _location: &Location,
            _files: &[FileRecord],
        ) -> Result<(), AppError> {
            Err(AppError::General("disk full".to_string()))
        }
    }

    pub(crate) fn write_image(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 251) as u8, 7])
        })
        .save(path)
        .unwrap();
    }

    fn test_config(probe_concurrency: usize) -> AppConfig {
        AppConfig {
            image_extensions: vec!["png".to_string(), "jpg".to_string()],
            probe_concurrency,
            ..AppConfig::default()
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        catalog: Arc<SqliteCatalog>,
        observer: Arc<RecordingObserver>,
        location: Location,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
            let mut location = Location::new(dir.path().to_string_lossy().to_string());
            location.tags_to_add.insert(Uuid::new_v4());
            catalog.create_location(&location).unwrap();
            Self {
                dir,
                catalog,
                observer: Arc::new(RecordingObserver::default()),
                location,
            }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().to_string()
        }

        fn synchronizer(&self) -> LocationSynchronizer {
            LocationSynchronizer::new(
                self.catalog.clone(),
                self.observer.clone(),
                &test_config(4),
            )
        }

        fn files(&self) -> Vec<FileRecord> {
            self.catalog
                .search_files(
                    &SearchCriteria::LocationEquals(self.location.id),
                    FileOrder::AbsolutePath,
                    OrderDirection::Asc,
                )
                .unwrap()
        }
    }

    #[tokio::test]
    async fn new_file_is_added_next_to_known_one() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("a.png"), 100, 100);
        let sync = fx.synchronizer();
        let cancel = AtomicBool::new(false);
        sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        write_image(&fx.dir.path().join("b.png"), 200, 200);
        let report = sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        assert_eq!(report.outcome, SyncOutcome::Completed);
        assert_eq!(report.created_count, 1);
        assert_eq!(report.removed_count, 0);
        let files = fx.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].absolute_path, fx.path("b.png"));
        assert_eq!((files[1].width, files[1].height), (200, 200));
        assert_eq!(files[1].tags, fx.location.tags_to_add);
        assert_eq!(files[1].relative_path, "/b.png");
    }

    #[tokio::test]
    async fn renamed_file_keeps_identity_and_tags() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("old.png"), 100, 100);
        let sync = fx.synchronizer();
        let cancel = AtomicBool::new(false);
        sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        let mut original = fx.files().remove(0);
        let user_tag = Uuid::new_v4();
        original.tags.insert(user_tag);
        fx.catalog.save_file(&original).unwrap();

        fs::create_dir_all(fx.dir.path().join("moved")).unwrap();
        fs::rename(fx.path("old.png"), fx.dir.path().join("moved/new.png")).unwrap();
        let report = sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        assert_eq!(report.renamed_count, 1);
        assert_eq!(report.created_count, 0);
        assert_eq!(report.removed_count, 0);
        let files = fx.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, original.id);
        assert!(files[0].tags.contains(&user_tag));
        assert_eq!(files[0].absolute_path, fx.path("moved/new.png"));
        assert_eq!(files[0].relative_path, "/moved/new.png");
        assert!(!files[0].is_broken);
    }

    #[tokio::test]
    async fn vanished_file_is_marked_broken_not_deleted() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("gone.png"), 30, 30);
        let sync = fx.synchronizer();
        let cancel = AtomicBool::new(false);
        sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        fs::remove_file(fx.path("gone.png")).unwrap();
        let report = sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        assert_eq!(report.removed_count, 1);
        let files = fx.files();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_broken);
        assert!(fx
            .observer
            .notices
            .lock()
            .unwrap()
            .contains(&Notice::FilesMissing {
                location_id: fx.location.id,
                count: 1
            }));

        // Coming back clears the flag.
        write_image(&fx.dir.path().join("gone.png"), 30, 30);
        let report = sync.sync_one(&mut fx.location, &cancel).await.unwrap();
        assert_eq!(report.recovered_count, 1);
        assert!(!fx.files()[0].is_broken);
    }

    #[tokio::test]
    async fn unreachable_root_leaves_records_untouched() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("keep.png"), 10, 10);
        let sync = fx.synchronizer();
        let cancel = AtomicBool::new(false);
        sync.sync_one(&mut fx.location, &cancel).await.unwrap();
        let before = fx.files();

        fx.location.path = fx.path("does-not-exist");
        let report = sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        assert_eq!(report.outcome, SyncOutcome::Broken);
        assert!(fx.location.is_broken);
        assert_eq!(fx.files(), before);
        assert_eq!(
            fx.observer.phases.lock().unwrap().last(),
            Some(&SyncPhase::Broken)
        );
    }

    #[tokio::test]
    async fn unreadable_file_is_skipped_until_next_sync() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("good.png"), 10, 10);
        fs::write(fx.path("corrupt.png"), "not a png").unwrap();
        let sync = fx.synchronizer();
        let cancel = AtomicBool::new(false);

        let report = sync.sync_one(&mut fx.location, &cancel).await.unwrap();

        assert_eq!(report.created_count, 1);
        assert_eq!(fx.files()[0].absolute_path, fx.path("good.png"));
    }

    #[tokio::test]
    async fn phases_follow_the_pipeline() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("a.png"), 5, 5);
        let sync = fx.synchronizer();
        sync.sync_one(&mut fx.location, &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(
            *fx.observer.phases.lock().unwrap(),
            vec![
                SyncPhase::Scanning,
                SyncPhase::Reconciling,
                SyncPhase::ProbingMetadata,
                SyncPhase::Committing,
                SyncPhase::Idle,
            ]
        );
        assert_eq!(*fx.observer.probe_progress.lock().unwrap(), vec![1.0]);
    }

    #[tokio::test]
    async fn cancelled_sync_commits_partial_results() {
        let mut fx = Fixture::new();
        for i in 0..6 {
            write_image(&fx.dir.path().join(format!("{i}.png")), 10 + i, 10);
        }
        let sync = LocationSynchronizer::new(
            fx.catalog.clone(),
            fx.observer.clone(),
            &test_config(1),
        );

        struct CancelAfterFirst(AtomicBool);
        impl SyncObserver for CancelAfterFirst {
            fn on_probe_progress(&self, _location_id: Uuid, _fraction: f64) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let observer = Arc::new(CancelAfterFirst(AtomicBool::new(false)));
        let sync = LocationSynchronizer {
            observer: observer.clone(),
            ..sync
        };

        let report = sync.sync_one(&mut fx.location, &observer.0).await.unwrap();

        assert_eq!(report.outcome, SyncOutcome::Cancelled);
        assert_eq!(report.created_count, 1);
        assert_eq!(fx.files().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_sync_does_not_flag_missing_records() {
        let mut fx = Fixture::new();
        write_image(&fx.dir.path().join("a.png"), 10, 10);
        let sync = fx.synchronizer();
        sync.sync_one(&mut fx.location, &AtomicBool::new(false))
            .await
            .unwrap();

        fs::remove_file(fx.path("a.png")).unwrap();
        write_image(&fx.dir.path().join("b.png"), 20, 20);
        let report = sync
            .sync_one(&mut fx.location, &AtomicBool::new(true))
            .await
            .unwrap();

        assert_eq!(report.outcome, SyncOutcome::Cancelled);
        assert_eq!(report.removed_count, 0);
        assert_eq!(report.created_count, 0);
        let files = fx.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].absolute_path, fx.path("a.png"));
        assert!(!files[0].is_broken);
        assert!(!fx
            .observer
            .notices
            .lock()
            .unwrap()
            .iter()
            .any(|n| matches!(n, Notice::FilesMissing { .. })));
    }

    #[tokio::test]
    async fn catalog_write_failure_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("a.png"), 10, 10);
        let inner = SqliteCatalog::open_in_memory().unwrap();
        let mut location = Location::new(dir.path().to_string_lossy().to_string());
        inner.create_location(&location).unwrap();
        let catalog = Arc::new(ReadOnlyCatalog(inner));

        let sync =
            LocationSynchronizer::new(catalog.clone(), Arc::new(NoopObserver), &test_config(2));
        let result = sync.sync_one(&mut location, &AtomicBool::new(false)).await;

        assert!(result.is_err());
        let files = catalog
            .search_files(&SearchCriteria::All, FileOrder::Id, OrderDirection::Asc)
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn sync_all_runs_each_location_and_reports_new_files() {
        let first = Fixture::new();
        let other_dir = tempfile::tempdir().unwrap();
        write_image(&first.dir.path().join("a.png"), 10, 10);
        write_image(&other_dir.path().join("b.png"), 10, 12);
        let second = Location::new(other_dir.path().to_string_lossy().to_string());
        first.catalog.create_location(&second).unwrap();
        let broken = Location::new("/nonexistent/gallery_sync_sync_all");
        first.catalog.create_location(&broken).unwrap();

        let sync = first.synchronizer();
        let mut locations = vec![first.location.clone(), broken, second];
        let summary = sync
            .sync_all(&mut locations, &AtomicBool::new(false))
            .await
            .unwrap();

        assert!(summary.found_new_files);
        assert!(!summary.cancelled);
        let outcomes: Vec<SyncOutcome> = summary.reports.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                SyncOutcome::Completed,
                SyncOutcome::Broken,
                SyncOutcome::Completed
            ]
        );
        assert!(locations[1].is_broken);
        assert_eq!(
            *first.observer.location_progress.lock().unwrap(),
            vec![(1, 3), (2, 3), (3, 3)]
        );
        assert!(first
            .observer
            .notices
            .lock()
            .unwrap()
            .contains(&Notice::NewFilesDetected { count: 2 }));

        let all: BTreeSet<String> = first
            .catalog
            .search_files(&SearchCriteria::All, FileOrder::Id, OrderDirection::Asc)
            .unwrap()
            .into_iter()
            .map(|f| f.absolute_path)
            .collect();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn sync_all_stops_when_cancelled_up_front() {
        let fx = Fixture::new();
        let sync = fx.synchronizer();
        let mut locations = vec![fx.location.clone()];

        let summary = sync
            .sync_all(&mut locations, &AtomicBool::new(true))
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert!(summary.reports.is_empty());
        assert!(!summary.found_new_files);
    }
}
