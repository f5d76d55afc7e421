use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use image::{DynamicImage, ImageFormat, ImageReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::thumbnail::{ThumbnailRequest, ThumbnailResponse};
use crate::path_scope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailSettings {
    pub encoding: String,
    /// Longest edge in pixels.
    pub size: u32,
}

impl From<&AppConfig> for ThumbnailSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            encoding: config.thumbnail_encoding.clone(),
            size: config.thumbnail_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The record already points at a thumbnail.
    AlreadyResolved,
    /// A thumbnail was already on disk; the record can use this path now.
    Resolved(String),
    Queued,
    AlreadyQueued,
}

/// `<dir>/<uuid-v5 of source>.<encoding>`. Stable across runs so an existing
/// thumbnail can be found without asking the worker.
pub fn thumbnail_path(source_path: &str, dir: &Path, encoding: &str) -> PathBuf {
    let name = Uuid::new_v5(&Uuid::NAMESPACE_URL, source_path.as_bytes());
    dir.join(format!("{name}.{encoding}"))
}

type Pending = Arc<Mutex<HashSet<Uuid>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashSet<Uuid>> {
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Generates thumbnails one at a time on a dedicated thread.
pub struct ThumbnailPipeline {
    requests: Option<mpsc::Sender<ThumbnailRequest>>,
    worker: Option<JoinHandle<()>>,
    pending: Pending,
    terminated: Arc<AtomicBool>,
    encoding: String,
}

pub struct ThumbnailResponses {
    rx: UnboundedReceiver<ThumbnailResponse>,
    pending: Pending,
    terminated: Arc<AtomicBool>,
}

impl ThumbnailResponses {
    /// Next response in request order. Returns `None` once the pipeline is
    /// terminated.
    pub async fn recv(&mut self) -> Option<ThumbnailResponse> {
        if self.terminated.load(Ordering::Acquire) {
            return None;
        }
        let response = self.rx.recv().await?;
        if self.terminated.load(Ordering::Acquire) {
            return None;
        }
        lock(&self.pending).remove(&response.file_id());
        Some(response)
    }
}

impl ThumbnailPipeline {
    pub fn start(settings: ThumbnailSettings) -> Result<(Self, ThumbnailResponses), AppError> {
        let (request_tx, request_rx) = mpsc::channel::<ThumbnailRequest>();
        let (response_tx, response_rx) = unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(HashSet::new()));
        let terminated = Arc::new(AtomicBool::new(false));

        let worker_terminated = terminated.clone();
        let size = settings.size.max(1);
        let worker = std::thread::Builder::new()
            .name("thumbnail-worker".to_string())
            .spawn(move || run_worker(request_rx, response_tx, worker_terminated, size))?;

        let pipeline = Self {
            requests: Some(request_tx),
            worker: Some(worker),
            pending: pending.clone(),
            terminated: terminated.clone(),
            encoding: settings.encoding,
        };
        let responses = ThumbnailResponses {
            rx: response_rx,
            pending,
            terminated,
        };
        Ok((pipeline, responses))
    }

    #[cfg(test)]
    fn is_pending(&self, file_id: Uuid) -> bool {
        lock(&self.pending).contains(&file_id)
    }

    pub fn ensure(&self, file: &FileRecord, dir: &Path) -> Result<EnsureOutcome, AppError> {
        let Some(requests) = self.requests.as_ref() else {
            return Err(AppError::Thumbnail("pipeline terminated".to_string()));
        };
        if file.thumbnail_path.is_some() {
            return Ok(EnsureOutcome::AlreadyResolved);
        }

        let target = thumbnail_path(&file.absolute_path, dir, &self.encoding);
        if target.is_file() {
            return Ok(EnsureOutcome::Resolved(target.to_string_lossy().to_string()));
        }

        if !lock(&self.pending).insert(file.id) {
            return Ok(EnsureOutcome::AlreadyQueued);
        }

        let request = ThumbnailRequest {
            source_path: file.absolute_path.clone(),
            file_id: file.id,
            thumbnail_directory: dir.to_string_lossy().to_string(),
            encoding: self.encoding.clone(),
        };
        if requests.send(request).is_err() {
            lock(&self.pending).remove(&file.id);
            return Err(AppError::Thumbnail("thumbnail worker stopped".to_string()));
        }
        Ok(EnsureOutcome::Queued)
    }

    /// Stops the worker after its current request and drops the rest of the
    /// queue. Safe to call more than once.
    ///
    /// Blocks the calling thread until that request is done; from async code
    /// use [`ThumbnailPipeline::shutdown`].
    pub fn terminate(&mut self) {
        self.terminated.store(true, Ordering::Release);
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("thumbnail worker panicked");
            }
            debug!("thumbnail worker stopped");
        }
        lock(&self.pending).clear();
    }
}

impl ThumbnailPipeline {
    /// Terminates the pipeline on the blocking pool so the runtime keeps
    /// serving other tasks while the worker finishes.
    pub async fn shutdown(mut self) -> Result<(), AppError> {
        tokio::task::spawn_blocking(move || self.terminate())
            .await
            .map_err(|e| AppError::General(format!("thumbnail shutdown failed: {e}")))
    }
}

impl Drop for ThumbnailPipeline {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run_worker(
    requests: mpsc::Receiver<ThumbnailRequest>,
    responses: UnboundedSender<ThumbnailResponse>,
    terminated: Arc<AtomicBool>,
    size: u32,
) {
    for request in requests {
        if terminated.load(Ordering::Acquire) {
            break;
        }
        let response = match generate_thumbnail(&request, size) {
            Ok(thumbnail_path) => ThumbnailResponse::Generated {
                file_id: request.file_id,
                thumbnail_path,
            },
            Err(e) => {
                warn!(source = %request.source_path, error = %e, "thumbnail generation failed");
                ThumbnailResponse::Failed {
                    file_id: request.file_id,
                    error: e.to_string(),
                }
            }
        };
        if terminated.load(Ordering::Acquire) || responses.send(response).is_err() {
            break;
        }
    }
}

fn generate_thumbnail(request: &ThumbnailRequest, size: u32) -> Result<String, AppError> {
    let format = ImageFormat::from_extension(&request.encoding).ok_or_else(|| {
        AppError::Thumbnail(format!("unsupported encoding: {}", request.encoding))
    })?;
    let dir = Path::new(&request.thumbnail_directory);
    fs::create_dir_all(dir)?;
    let target = thumbnail_path(&request.source_path, dir, &request.encoding);

    let source = ImageReader::open(&request.source_path)?
        .with_guessed_format()?
        .decode()?;
    let resized = if source.width() > size || source.height() > size {
        source.thumbnail(size, size)
    } else {
        source
    };
    let resized = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    let partial = target.with_extension(format!("{}.part", request.encoding));
    if let Err(e) = resized
        .save_with_format(&partial, format)
        .map_err(AppError::from)
        .and_then(|_| fs::rename(&partial, &target).map_err(AppError::from))
    {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    debug!(source = %request.source_path, thumbnail = %target.display(), "generated thumbnail");
    Ok(target.to_string_lossy().to_string())
}

/// Applies a worker response to the matching record. A failure points the
/// record at its source image. Returns the updated record, if one matched.
pub fn apply_response<'a>(
    records: &'a mut [FileRecord],
    response: &ThumbnailResponse,
) -> Option<&'a FileRecord> {
    let record = records.iter_mut().find(|r| r.id == response.file_id())?;
    record.thumbnail_path = Some(response.display_path(&record.absolute_path));
    Some(record)
}

fn move_file(source: &Path, destination: &Path) -> Result<(), AppError> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    // Rename fails across devices; copy next to the destination first so it
    // only ever appears complete.
    let partial = destination.with_extension("part");
    fs::copy(source, &partial)?;
    fs::rename(&partial, destination)?;
    fs::remove_file(source)?;
    Ok(())
}

/// Moves every `*.<encoding>` file in `source_dir` into `target_dir`, one at
/// a time. Returns how many were moved.
pub fn relocate_thumbnails(
    source_dir: &Path,
    target_dir: &Path,
    encoding: &str,
) -> Result<usize, AppError> {
    for dir in [source_dir, target_dir] {
        if !dir.is_dir() {
            return Err(AppError::NotFound(format!(
                "directory {}",
                dir.display()
            )));
        }
    }
    if fs::canonicalize(source_dir)? == fs::canonicalize(target_dir)? {
        return Ok(0);
    }

    let encoding = encoding.to_ascii_lowercase();
    let mut moved = 0;
    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = entry.file_type()?.is_file()
            && path_scope::extension_lowercase(&path).as_deref() == Some(encoding.as_str());
        if !matches {
            continue;
        }
        let destination = target_dir.join(entry.file_name());
        move_file(&path, &destination)?;
        moved += 1;
        debug!(from = %path.display(), to = %destination.display(), "moved thumbnail");
    }

    info!(
        from = %source_dir.display(),
        to = %target_dir.display(),
        count = moved,
        "relocated thumbnails"
    );
    Ok(moved)
}
