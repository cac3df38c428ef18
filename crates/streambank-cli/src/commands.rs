//! CLI command implementations

use crate::output::{format_entries, to_json, OutputFormat};
use crate::probe::HttpProbePipeline;
use anyhow::{bail, Context};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use streambank_core::{
    playlist, Catalog, CatalogLoader, CatalogStore, Category, LoadReport, PlaybackSession,
    PlaybackState, PlaylistFormat, PlaylistSource, Settings, SourceLocation,
};

/// Parse a source argument: `location` or `category=location`
pub fn parse_source(arg: &str) -> PlaylistSource {
    let (category, location) = match arg.split_once('=') {
        Some((prefix, rest))
            if !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            (Category::from(prefix), rest)
        }
        _ => (Category::Radio, arg),
    };

    PlaylistSource {
        format: PlaylistFormat::detect(location),
        location: SourceLocation::parse(location),
        category,
    }
}

/// Parse one playlist file and list its entries
pub async fn parse(
    file: &Path,
    category: &str,
    playlist_format: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let playlist_format = match playlist_format {
        Some(name) => name.parse()?,
        None => PlaylistFormat::detect(&file.to_string_lossy())
            .unwrap_or_else(|| PlaylistFormat::sniff(&String::from_utf8_lossy(&bytes))),
    };

    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = playlist::parse_bytes(&bytes, playlist_format, &Category::from(category), &source)?;

    if format == OutputFormat::Json {
        println!("{}", to_json(&parsed));
        return Ok(());
    }

    println!("Parsed {} ({:?})", file.display(), playlist_format);
    for block in &parsed.categories {
        println!("\n{} ({} entries)", block.info.name, block.entries.len());
        println!("{}", format_entries(&block.entries, format));
    }
    if parsed.skipped > 0 {
        println!("\nSkipped: {}", parsed.skipped);
    }
    Ok(())
}

/// Build a catalog from several sources and print it
pub async fn catalog(sources: &[String], settings: Settings, format: OutputFormat) -> anyhow::Result<()> {
    let sources: Vec<_> = sources.iter().map(|s| parse_source(s)).collect();
    let loader = CatalogLoader::with_default_fetcher(settings)?;
    let report = loader.load(&sources).await;

    if format == OutputFormat::Json {
        println!("{}", to_json(&report_json(&report)));
    } else {
        for info in report.catalog.categories() {
            let entries = report.catalog.all(&info.category);
            println!("\n{} [{}] ({} entries)", info.name, info.category, entries.len());
            println!("{}", format_entries(entries, format));
        }
        println!("\nTotal: {} entries", report.catalog.len());
        print_failures(&report);
    }

    if report.loaded_sources == 0 {
        bail!("no source could be loaded");
    }
    Ok(())
}

/// Load sources, then refresh them on the configured interval until Ctrl-C
pub async fn watch(sources: &[String], settings: Settings, format: OutputFormat) -> anyhow::Result<()> {
    let sources: Vec<_> = sources.iter().map(|s| parse_source(s)).collect();
    let loader = Arc::new(CatalogLoader::with_default_fetcher(settings)?);
    let report = loader.load(&sources).await;
    print_failures(&report);
    if report.loaded_sources == 0 {
        bail!("no source could be loaded");
    }

    let settings = report.settings;
    let store = CatalogStore::new(report.catalog);
    println!("{}", format_stats(&store.snapshot(), format));

    if !settings.auto_refresh {
        println!("Auto refresh is disabled");
        return Ok(());
    }

    let mut updates = store.subscribe();
    let refresher = loader.spawn_auto_refresh(store.clone(), sources, settings.refresh_interval());
    println!("Refreshing every {}s, Ctrl-C to stop", settings.refresh_interval().as_secs());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let catalog = updates.borrow_and_update().clone();
                println!("{}", format_stats(&catalog, format));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    refresher.abort();
    Ok(())
}

fn format_stats(catalog: &Catalog, format: OutputFormat) -> String {
    let stats = catalog.stats();
    if format == OutputFormat::Json {
        return serde_json::to_string(&stats).unwrap_or_else(|_| "{}".to_string());
    }
    let counts: Vec<String> = stats
        .categories
        .iter()
        .map(|(category, count)| format!("{}: {}", category, count))
        .collect();
    format!("Catalog: {} entries ({})", stats.total, counts.join(", "))
}

/// Select an entry and drive it until it plays or fails.
///
/// Returns whether a playable source was found.
pub async fn resolve(
    sources: &[String],
    category: &str,
    index: usize,
    timeout: Duration,
    settings: Settings,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let sources: Vec<_> = sources.iter().map(|s| parse_source(s)).collect();
    let loader = CatalogLoader::with_default_fetcher(settings)?;
    let report = loader.load(&sources).await;
    if format != OutputFormat::Json {
        print_failures(&report);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let session = PlaybackSession::new(
        report.settings.playback(),
        CatalogStore::new(report.catalog),
        HttpProbePipeline::new(client),
    );
    let handle = session.handle();
    let mut states = handle.subscribe_state();
    let mut notices = handle.subscribe_notices();
    tokio::spawn(session.run());

    if format != OutputFormat::Json {
        tokio::spawn(async move {
            while let Ok(notice) = notices.recv().await {
                eprintln!("[{}] {}", notice.code, notice.message);
            }
        });
    }

    let entry = handle.select(category, index).await?;
    if format != OutputFormat::Json {
        println!("Resolving {} ({})", entry.name, entry.id);
    }

    let finished = tokio::time::timeout(timeout, async {
        states
            .wait_for(|s| matches!(s.state, PlaybackState::Playing | PlaybackState::Failed))
            .await
            .map(|s| s.clone())
    })
    .await;

    let snapshot = match finished {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) => bail!("playback session ended unexpectedly"),
        Err(_) => {
            eprintln!("Timed out after {}s", timeout.as_secs());
            handle.snapshot()
        }
    };
    handle.shutdown();

    let playing = snapshot.state == PlaybackState::Playing;
    if format == OutputFormat::Json {
        println!(
            "{}",
            to_json(&json!({
                "entry": entry,
                "state": snapshot.state,
                "url": snapshot.active_url,
                "error": snapshot.error,
            }))
        );
    } else if playing {
        println!("Playable: {}", snapshot.active_url.unwrap_or_default());
    } else {
        println!(
            "Unplayable: {}",
            snapshot.error.unwrap_or_else(|| snapshot.state.to_string())
        );
    }

    Ok(playing)
}

fn print_failures(report: &LoadReport) {
    for failure in &report.failures {
        eprintln!("Failed to load {}: {}", failure.location, failure.error);
    }
}

fn report_json(report: &LoadReport) -> serde_json::Value {
    let categories: Vec<_> = report
        .catalog
        .categories()
        .map(|info| {
            json!({
                "info": info,
                "entries": report.catalog.all(&info.category),
            })
        })
        .collect();
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|f| {
            json!({
                "location": f.location.to_string(),
                "code": f.error.error_code(),
                "error": f.error.to_string(),
            })
        })
        .collect();

    json!({
        "categories": categories,
        "total": report.catalog.len(),
        "skipped": report.skipped_entries,
        "settings": report.settings,
        "failures": failures,
    })
}
