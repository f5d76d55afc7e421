use std::path::Path;

use chrono::{DateTime, Utc};
use image::ImageReader;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::file_record::{FileMetadata, ProbedFile};
use crate::services::limiter;

/// Reads size, timestamps and pixel dimensions of one image. Dimensions come
/// from the header so the image itself is never decoded. The format is taken
/// from the file contents, not its extension.
pub fn probe_metadata(path: &Path) -> Result<FileMetadata, AppError> {
    let metadata = path.metadata()?;
    if !metadata.is_file() {
        return Err(AppError::General(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    let (width, height) = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?;

    let date_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let date_created = metadata.created().ok().map(DateTime::<Utc>::from);

    Ok(FileMetadata {
        width,
        height,
        size: metadata.len(),
        date_created,
        date_modified,
    })
}

pub async fn probe_file(path: String) -> Result<ProbedFile, AppError> {
    tokio::task::spawn_blocking(move || {
        let metadata = probe_metadata(Path::new(&path))?;
        debug!(path = %path, width = metadata.width, height = metadata.height, "probed file");
        Ok(ProbedFile { path, metadata })
    })
    .await
    .map_err(|e| AppError::General(format!("metadata probe task failed: {e}")))?
}

/// Probes `paths` with at most `max_concurrent` reads in flight. Files whose
/// probe fails are logged and left out. The flag is true when cancellation
/// stopped the batch before every path was started.
pub async fn probe_batch<P, C>(
    paths: Vec<String>,
    max_concurrent: usize,
    on_progress: P,
    is_cancelled: C,
) -> (Vec<ProbedFile>, bool)
where
    P: FnMut(f64),
    C: Fn() -> bool,
{
    let total = paths.len();
    let tasks: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| move || probe_file(path))
        .collect();

    let results = limiter::run_limited(tasks, max_concurrent, on_progress, is_cancelled).await;

    let cancelled = results.len() < total;
    let probed = paths
        .iter()
        .zip(results)
        .filter_map(|(path, result)| match result {
            Ok(probed) => Some(probed),
            Err(e) => {
                warn!(path = %path, error = %e, "could not read image metadata");
                None
            }
        })
        .collect();
    (probed, cancelled)
}
