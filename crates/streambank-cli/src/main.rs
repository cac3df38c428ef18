//! StreamBank CLI - Playlist and Source Resolution Tool
//!
//! Features:
//! - Playlist parsing (JSON manifest, M3U/EXTM3U)
//! - Catalog building from several sources
//! - Periodic catalog refresh
//! - Source resolution with retries and backup failover

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use streambank_core::Settings;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod probe;

use output::OutputFormat;

/// StreamBank CLI - Radio and TV stream bank toolkit
#[derive(Parser)]
#[command(name = "streambank")]
#[command(author = "StreamBank Developers")]
#[command(version)]
#[command(about = "Parse playlists, build stream catalogs and resolve playable sources", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a single playlist document
    Parse {
        /// Path to a manifest or M3U file
        file: PathBuf,

        /// Category stamped on M3U entries
        #[arg(long, default_value = "radio")]
        category: String,

        /// Playlist format (json, m3u); detected when omitted
        #[arg(long = "playlist-format")]
        playlist_format: Option<String>,
    },

    /// Build a catalog from one or more sources
    Catalog {
        /// Sources as `location` or `category=location`
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Load sources and keep the catalog fresh, printing stats on every refresh
    Watch {
        /// Sources as `location` or `category=location`
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Select an entry and resolve a playable source for it
    Resolve {
        /// Sources as `location` or `category=location`
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        /// Category of the entry
        category: String,

        /// Position of the entry in its category
        index: usize,

        /// Give up after this many seconds
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    streambank_core::init();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Parse { file, category, playlist_format } => {
            commands::parse(&file, &category, playlist_format.as_deref(), cli.format).await?;
        }
        Commands::Catalog { sources } => {
            commands::catalog(&sources, settings, cli.format).await?;
        }
        Commands::Watch { sources } => {
            commands::watch(&sources, settings, cli.format).await?;
        }
        Commands::Resolve { sources, category, index, timeout } => {
            let resolved = commands::resolve(
                &sources,
                &category,
                index,
                Duration::from_secs(timeout),
                settings,
                cli.format,
            )
            .await?;
            if !resolved {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
