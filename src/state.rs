use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::data::SqliteCatalog;
use crate::error::AppError;
use crate::services::sync_service::{Notice, SyncObserver, SyncPhase};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncProgressState {
    pub location_index: usize,
    pub location_total: usize,
    pub location_id: Option<Uuid>,
    pub probe_fraction: f64,
    pub status: String,
}

impl Default for SyncProgressState {
    fn default() -> Self {
        Self {
            location_index: 0,
            location_total: 0,
            location_id: None,
            probe_fraction: 0.0,
            status: "idle".to_string(),
        }
    }
}

/// Keeps the latest sync progress in a shared snapshot and logs notices.
pub struct ProgressObserver {
    status: Arc<Mutex<SyncProgressState>>,
}

impl ProgressObserver {
    pub fn new(status: Arc<Mutex<SyncProgressState>>) -> Self {
        Self { status }
    }

    fn update(&self, apply: impl FnOnce(&mut SyncProgressState)) {
        let mut guard = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut guard);
    }
}

fn phase_status(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Idle => "idle",
        SyncPhase::Scanning => "scanning",
        SyncPhase::Reconciling => "reconciling",
        SyncPhase::ProbingMetadata => "probing",
        SyncPhase::Committing => "committing",
        SyncPhase::Broken => "broken",
        SyncPhase::Cancelled => "cancelled",
    }
}

impl SyncObserver for ProgressObserver {
    fn on_phase(&self, location_id: Uuid, phase: SyncPhase) {
        self.update(|state| {
            state.location_id = Some(location_id);
            state.status = phase_status(phase).to_string();
            if phase == SyncPhase::Scanning {
                state.probe_fraction = 0.0;
            }
        });
    }

    fn on_location_progress(&self, index: usize, total: usize) {
        self.update(|state| {
            state.location_index = index;
            state.location_total = total;
        });
    }

    fn on_probe_progress(&self, _location_id: Uuid, fraction: f64) {
        self.update(|state| state.probe_fraction = fraction);
    }

    fn notify(&self, notice: Notice) {
        match notice {
            Notice::LocationUnreachable { path, .. } => {
                warn!(location = %path, "location could not be found; re-point it to recover")
            }
            Notice::NewFilesDetected { count } => info!(count, "new images found"),
            Notice::FilesMissing { location_id, count } => {
                warn!(location = %location_id, count, "images went missing")
            }
        }
    }
}

pub struct AppState {
    pub catalog: Arc<SqliteCatalog>,
    pub config: AppConfig,
    pub cancel_flag: Arc<AtomicBool>,
    pub sync_status: Arc<Mutex<SyncProgressState>>,
}

impl AppState {
    pub fn open(config: AppConfig) -> Result<Self, AppError> {
        let catalog = SqliteCatalog::open(&config.database_path)?;
        Ok(Self::with_catalog(config, catalog))
    }

    pub fn with_catalog(config: AppConfig, catalog: SqliteCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            sync_status: Arc::new(Mutex::new(SyncProgressState::default())),
        }
    }

    pub fn observer(&self) -> Arc<ProgressObserver> {
        Arc::new(ProgressObserver::new(self.sync_status.clone()))
    }

    /// Clears a previous cancellation and hands out the flag for a new run.
    pub fn reset_cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.store(false, Ordering::Relaxed);
        self.cancel_flag.clone()
    }

    pub fn mark_cancelled(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn sync_snapshot(&self) -> SyncProgressState {
        self.sync_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
