//! Catalog loading from playlist sources
//!
//! Each source is fetched and parsed on its own; a source that fails to
//! fetch or parse contributes zero entries and is reported, the others still
//! load.

use crate::{
    catalog::{Catalog, CatalogStore},
    config::Settings,
    playlist::{self, ParsedCategory, PlaylistFormat},
    Category, Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Where a playlist document lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceLocation {
    File(PathBuf),
    Url(Url),
}

impl SourceLocation {
    /// `http(s)://` locations are URLs, everything else a path
    pub fn parse(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => SourceLocation::Url(url),
            _ => SourceLocation::File(PathBuf::from(location)),
        }
    }

    /// Short name used in logs and synthesized ids
    pub fn name(&self) -> String {
        match self {
            SourceLocation::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            SourceLocation::Url(url) => url.to_string(),
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocation::File(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => write!(f, "{}", url),
        }
    }
}

/// One playlist document to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSource {
    pub location: SourceLocation,
    /// Explicit format; detected from the location or content when `None`
    pub format: Option<PlaylistFormat>,
    /// Category stamped on M3U entries (manifests carry their own)
    pub category: Category,
}

impl PlaylistSource {
    /// A JSON manifest
    pub fn manifest(location: &str) -> Self {
        Self {
            location: SourceLocation::parse(location),
            format: Some(PlaylistFormat::Manifest),
            category: Category::Radio,
        }
    }

    /// An M3U playlist whose entries all belong to `category`
    pub fn m3u(location: &str, category: impl Into<Category>) -> Self {
        Self {
            location: SourceLocation::parse(location),
            format: Some(PlaylistFormat::M3u),
            category: category.into(),
        }
    }

    /// Format from the location, falling back to the content
    pub fn resolve_format(&self, content: &[u8]) -> PlaylistFormat {
        self.format
            .or_else(|| PlaylistFormat::detect(&self.location.to_string()))
            .unwrap_or_else(|| PlaylistFormat::sniff(&String::from_utf8_lossy(content)))
    }
}

/// Transport for playlist documents
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    async fn fetch(&self, location: &SourceLocation) -> Result<Vec<u8>>;
}

/// Reads files with tokio and URLs with reqwest
pub struct DefaultFetcher {
    client: Client,
}

impl DefaultFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::SourceFetch {
                location: "http client".to_string(),
                source: e,
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlaylistFetcher for DefaultFetcher {
    #[instrument(skip(self), fields(location = %location))]
    async fn fetch(&self, location: &SourceLocation) -> Result<Vec<u8>> {
        match location {
            SourceLocation::File(path) => Ok(tokio::fs::read(path).await?),
            SourceLocation::Url(url) => {
                // Cache-busting timestamp so intermediaries never serve a stale playlist
                let mut url = url.clone();
                url.query_pairs_mut()
                    .append_pair("t", &Utc::now().timestamp_millis().to_string());

                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| Error::SourceFetch {
                        location: location.to_string(),
                        source: e,
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Error::HttpStatus {
                        location: location.to_string(),
                        status: status.as_u16(),
                    });
                }

                let body = response.bytes().await.map_err(|e| Error::SourceFetch {
                    location: location.to_string(),
                    source: e,
                })?;
                debug!(bytes = body.len(), "Playlist fetched");
                Ok(body.to_vec())
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CachedDocument {
    body: Vec<u8>,
    fetched_at: DateTime<Utc>,
}

/// In-memory copy of fetched documents with time-based expiry
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: HashMap<SourceLocation, CachedDocument>,
}

impl ManifestCache {
    pub fn get(&self, location: &SourceLocation, max_age: Duration, now: DateTime<Utc>) -> Option<&[u8]> {
        let cached = self.entries.get(location)?;
        let age = now.signed_duration_since(cached.fetched_at);
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        (age <= max_age).then_some(cached.body.as_slice())
    }

    pub fn insert(&mut self, location: SourceLocation, body: Vec<u8>, now: DateTime<Utc>) {
        self.entries.insert(location, CachedDocument { body, fetched_at: now });
    }

    /// Drop every cached document
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A source that contributed nothing to the catalog
#[derive(Debug)]
pub struct SourceFailure {
    pub location: SourceLocation,
    pub error: Error,
}

/// Outcome of loading a set of sources
#[derive(Debug)]
pub struct LoadReport {
    pub catalog: Catalog,
    /// Base settings with manifest overrides applied
    pub settings: Settings,
    pub failures: Vec<SourceFailure>,
    /// Sources that parsed successfully
    pub loaded_sources: usize,
    /// Streams or lines skipped as malformed
    pub skipped_entries: usize,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Loads playlist sources into catalogs
pub struct CatalogLoader {
    fetcher: Arc<dyn PlaylistFetcher>,
    settings: Settings,
    cache: RwLock<ManifestCache>,
}

impl CatalogLoader {
    pub fn new(fetcher: Arc<dyn PlaylistFetcher>, settings: Settings) -> Self {
        Self {
            fetcher,
            settings,
            cache: RwLock::new(ManifestCache::default()),
        }
    }

    /// Loader with the default file/HTTP fetcher
    pub fn with_default_fetcher(settings: Settings) -> Result<Self> {
        let fetcher = DefaultFetcher::new(Duration::from_secs(30))?;
        Ok(Self::new(Arc::new(fetcher), settings))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Forget cached documents so the next load refetches everything
    pub async fn invalidate_cache(&self) {
        self.cache.write().await.invalidate();
        info!("Manifest cache cleared");
    }

    /// Fetch and parse every source, building one catalog
    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub async fn load(&self, sources: &[PlaylistSource]) -> LoadReport {
        let mut categories: Vec<ParsedCategory> = Vec::new();
        let mut failures = Vec::new();
        let mut settings = self.settings.clone();
        let mut loaded_sources = 0;
        let mut skipped_entries = 0;

        for source in sources {
            match self.load_source(source).await {
                Ok(parsed) => {
                    loaded_sources += 1;
                    skipped_entries += parsed.skipped;
                    if let Some(overrides) = parsed.settings.as_ref() {
                        match settings.merged_with(overrides) {
                            Ok(merged) => settings = merged,
                            Err(e) => warn!(source = %source.location, error = %e, "Ignoring manifest settings"),
                        }
                    }
                    categories.extend(parsed.categories);
                }
                Err(error) => {
                    warn!(source = %source.location, error = %error, "Source failed to load");
                    failures.push(SourceFailure {
                        location: source.location.clone(),
                        error,
                    });
                }
            }
        }

        let catalog = Catalog::load(categories);
        info!(
            loaded = loaded_sources,
            failed = failures.len(),
            entries = catalog.len(),
            "Sources loaded"
        );

        LoadReport {
            catalog,
            settings,
            failures,
            loaded_sources,
            skipped_entries,
        }
    }

    /// Load `sources` and swap the result into `store` if anything loaded
    pub async fn refresh(&self, store: &CatalogStore, sources: &[PlaylistSource]) -> LoadReport {
        let report = self.load(sources).await;
        if report.loaded_sources > 0 {
            store.replace(report.catalog.clone());
        } else {
            warn!("Refresh produced no usable source, keeping current catalog");
        }
        report
    }

    /// Reload periodically, replacing the catalog in `store` each time
    pub fn spawn_auto_refresh(
        self: Arc<Self>,
        store: CatalogStore,
        sources: Vec<PlaylistSource>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial load is the caller's
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("Refreshing catalog");
                self.refresh(&store, &sources).await;
            }
        })
    }

    async fn load_source(&self, source: &PlaylistSource) -> Result<playlist::ParsedPlaylist> {
        if let Some(body) = self.cached(&source.location).await {
            debug!(location = %source.location, "Using cached playlist");
            return Self::parse_source(source, &body);
        }

        let body = self.fetcher.fetch(&source.location).await?;
        let parsed = Self::parse_source(source, &body)?;

        // Cache only documents that parsed
        if self.settings.enable_cache {
            self.cache
                .write()
                .await
                .insert(source.location.clone(), body, Utc::now());
        }
        Ok(parsed)
    }

    fn parse_source(source: &PlaylistSource, body: &[u8]) -> Result<playlist::ParsedPlaylist> {
        let format = source.resolve_format(body);
        playlist::parse_bytes(body, format, &source.category, &source.location.name())
    }

    async fn cached(&self, location: &SourceLocation) -> Option<Vec<u8>> {
        if !self.settings.enable_cache {
            return None;
        }
        let cache = self.cache.read().await;
        cache
            .get(location, self.settings.cache_time(), Utc::now())
            .map(<[u8]>::to_vec)
    }
}
