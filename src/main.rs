use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use gallery_sync_lib::commands::{location_commands, thumbnail_commands};
use gallery_sync_lib::logging::init_logging;
use gallery_sync_lib::{AppConfig, AppState};

#[derive(Parser, Debug)]
#[command(name = "gallery-sync", about = "Keep an image catalog in sync with watched folders")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "GALLERY_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a directory and import its images
    AddLocation { path: String },
    /// Stop watching a location and forget its files
    RemoveLocation { id: Uuid },
    ListLocations,
    /// Point the import location at a directory
    SetDefaultLocation { path: String },
    /// Re-point a location whose directory was moved
    MoveLocation { id: Uuid, path: String },
    /// Bring every location in line with the disk
    Sync,
    /// Generate missing thumbnails
    Thumbnails,
    /// Move the thumbnail cache to another directory
    RelocateThumbnails { source: PathBuf, target: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let state = Arc::new(AppState::open(config).context("failed to open catalog")?);

    let signal_state = state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight work");
            signal_state.mark_cancelled();
        }
    });

    match cli.command {
        Command::AddLocation { path } => {
            print_json(&location_commands::add_location(&state, &path).await?)?
        }
        Command::RemoveLocation { id } => location_commands::remove_location(&state, id)?,
        Command::ListLocations => print_json(&location_commands::list_locations(&state)?)?,
        Command::SetDefaultLocation { path } => {
            print_json(&location_commands::set_default_location(&state, &path)?)?
        }
        Command::MoveLocation { id, path } => {
            print_json(&location_commands::move_location(&state, id, &path)?)?
        }
        Command::Sync => print_json(&location_commands::sync_locations(&state).await?)?,
        Command::Thumbnails => {
            print_json(&thumbnail_commands::generate_thumbnails(&state).await?)?
        }
        Command::RelocateThumbnails { source, target } => {
            let moved = thumbnail_commands::relocate_thumbnails(&state, &source, &target)?;
            if source == state.config.thumbnail_dir {
                let mut config = state.config.clone();
                config.thumbnail_dir = target;
                config
                    .save(&config_path)
                    .context("thumbnails moved but the config could not be updated")?;
            }
            print_json(&serde_json::json!({ "moved": moved }))?
        }
    }

    Ok(())
}
