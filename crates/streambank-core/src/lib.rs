//! StreamBank Core - Playlist and Playback Library
//!
//! This crate provides the core functionality for the stream bank:
//! - JSON manifest and M3U/EXTM3U playlist parsing
//! - Stream catalog grouped by category, with atomic replacement
//! - Source loading from files and URLs with caching and auto-refresh
//! - Playback session with retry, backup cascade and stale-event filtering
//! - Recently played history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      StreamBank Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Catalog    │  │   Playlist   │  │   Settings   │           │
//! │  │    Loader    │──│    Parser    │  │              │           │
//! │  └──────┬───────┘  └──────────────┘  └──────┬───────┘           │
//! │         │                                   │                   │
//! │  ┌──────┴───────┐                    ┌──────┴───────┐           │
//! │  │   Catalog    │────────────────────│   Playback   │           │
//! │  │    Store     │                    │   Session    │           │
//! │  └──────────────┘                    └──────┬───────┘           │
//! │                                             │                   │
//! │                  ┌──────────────┐    ┌──────┴───────┐           │
//! │                  │   History    │    │    Media     │           │
//! │                  │              │    │   Pipeline   │           │
//! │                  └──────────────┘    └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod playlist;
pub mod catalog;
pub mod loader;
pub mod history;
pub mod pipeline;
pub mod session;

pub use error::{Error, Result};
pub use types::*;
pub use config::{PlaybackConfig, Settings};
pub use playlist::{parse, CategoryInfo, ParsedPlaylist, PlaylistFormat, RawPlaylistInput};
pub use catalog::{Catalog, CatalogStats, CatalogStore};
pub use loader::{CatalogLoader, LoadReport, PlaylistFetcher, PlaylistSource, SourceLocation};
pub use history::{History, HistoryRecord};
pub use pipeline::{MediaPipeline, PipelineEvent, PipelineEvents, PipelineSignal};
pub use session::{PlaybackSession, SessionHandle, SessionNotice};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library initialization
pub fn init() {
    tracing::info!(version = VERSION, "StreamBank Core initialized");
}
