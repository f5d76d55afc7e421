pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub mod path_scope;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use data::{CatalogStore, SqliteCatalog};
pub use error::AppError;
pub use state::AppState;
