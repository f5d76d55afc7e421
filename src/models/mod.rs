pub mod file_record;
pub mod location;
pub mod scan;
pub mod search;
pub mod thumbnail;
