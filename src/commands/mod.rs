pub mod location_commands;
pub mod thumbnail_commands;
