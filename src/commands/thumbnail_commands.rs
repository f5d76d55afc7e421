use std::path::Path;
use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::{debug, warn};

use crate::data::CatalogStore;
use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::search::{FileOrder, OrderDirection, SearchCriteria};
use crate::models::thumbnail::ThumbnailResponse;
use crate::services::thumbnail_service::{
    self, EnsureOutcome, ThumbnailPipeline, ThumbnailSettings,
};
use crate::state::AppState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailSummary {
    pub already_resolved: usize,
    pub reused: usize,
    pub generated: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Makes sure every reachable file has a thumbnail and stores the resolved
/// paths in the catalog.
pub async fn generate_thumbnails(state: &AppState) -> Result<ThumbnailSummary, AppError> {
    let mut records: Vec<FileRecord> = state
        .catalog
        .search_files(&SearchCriteria::All, FileOrder::DateAdded, OrderDirection::Asc)?
        .into_iter()
        .filter(|f| !f.is_broken)
        .collect();
    let dir = state.config.thumbnail_dir.clone();
    std::fs::create_dir_all(&dir)?;

    let cancel = state.reset_cancel_flag();
    let (pipeline, mut responses) =
        ThumbnailPipeline::start(ThumbnailSettings::from(&state.config))?;
    let mut summary = ThumbnailSummary::default();
    let mut queued = 0usize;

    for record in records.iter_mut() {
        if cancel.load(Ordering::Relaxed) {
            summary.cancelled = true;
            break;
        }
        match pipeline.ensure(record, &dir)? {
            EnsureOutcome::AlreadyResolved => summary.already_resolved += 1,
            EnsureOutcome::Resolved(path) => {
                record.thumbnail_path = Some(path);
                state.catalog.save_file(record)?;
                summary.reused += 1;
            }
            EnsureOutcome::Queued => queued += 1,
            EnsureOutcome::AlreadyQueued => {}
        }
    }
    debug!(queued, "waiting for thumbnail worker");

    while queued > 0 {
        if cancel.load(Ordering::Relaxed) {
            summary.cancelled = true;
            break;
        }
        let Some(response) = responses.recv().await else {
            break;
        };
        queued -= 1;
        let updated = thumbnail_service::apply_response(&mut records, &response);
        match (&response, updated) {
            (ThumbnailResponse::Generated { .. }, Some(record)) => {
                state.catalog.save_file(record)?;
                summary.generated += 1;
            }
            (ThumbnailResponse::Generated { .. }, None) => summary.generated += 1,
            // The fallback stays in memory so the next run retries.
            (ThumbnailResponse::Failed { .. }, _) => summary.failed += 1,
        }
    }

    pipeline.shutdown().await?;
    if summary.failed > 0 {
        warn!(failed = summary.failed, "some thumbnails could not be generated");
    }
    Ok(summary)
}

/// Moves the thumbnail cache and re-points stored thumbnail paths at the new
/// directory.
pub fn relocate_thumbnails(
    state: &AppState,
    source_dir: &Path,
    target_dir: &Path,
) -> Result<usize, AppError> {
    let moved = thumbnail_service::relocate_thumbnails(
        source_dir,
        target_dir,
        &state.config.thumbnail_encoding,
    )?;

    let records = state
        .catalog
        .search_files(&SearchCriteria::All, FileOrder::Id, OrderDirection::Asc)?;
    for mut record in records {
        let Some(old) = record.thumbnail_path.as_deref().map(Path::new) else {
            continue;
        };
        if old.parent() != Some(source_dir) {
            continue;
        }
        let Some(name) = old.file_name() else {
            continue;
        };
        let new_path = target_dir.join(name);
        if !new_path.is_file() {
            continue;
        }
        record.thumbnail_path = Some(new_path.to_string_lossy().to_string());
        state.catalog.save_file(&record)?;
    }
    Ok(moved)
}
