pub mod catalog;
pub mod migrations;
pub mod repository;

pub use catalog::{CatalogStore, SqliteCatalog};
