pub mod limiter;
pub mod location_service;
pub mod probe_service;
pub mod reconcile_service;
pub mod rename_service;
pub mod scan_service;
pub mod sync_service;
pub mod thumbnail_service;
