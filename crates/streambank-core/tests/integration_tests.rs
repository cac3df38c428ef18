//! Integration tests for StreamBank Core

use std::time::Duration;
use streambank_core::{
    parse, Catalog, CatalogStore, Category, Error, LoadToken, MediaPipeline, PipelineErrorKind,
    PipelineEvents, PlaybackConfig, PlaybackSession, PlaybackState, RawPlaylistInput, Settings,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

const MANIFEST: &str = r##"{
    "version": "1.0",
    "settings": {"maxRetries": 3, "defaultVolume": 0.8},
    "categories": {
        "radio": {
            "name": "Radio",
            "color": "#ff0000",
            "streams": [
                {
                    "id": "test-fm",
                    "name": "Test FM",
                    "url": "https://a/x.m3u8",
                    "backupUrls": ["https://b/x.m3u8", "https://c/x.m3u8"],
                    "genre": "News"
                },
                {"name": "No Url"},
                {"name": "Jazz", "url": "https://jazz/live.m3u8"}
            ]
        },
        "tv": {
            "streams": [{"name": "Channel One", "url": "https://tv/one.m3u8", "quality": "HD"}]
        }
    }
}"##;

const M3U: &str = "#EXTM3U
#EXTINF:-1 tvg-id=\"one\" tvg-logo=\"https://img/one.png\" group-title=\"News\",Channel One
https://tv/one.m3u8
#EXTINF:-1,Channel Two
https://tv/two.m3u8
";

// =============================================================================
// Parsing and Catalog Tests
// =============================================================================

#[test]
fn test_manifest_parse_skips_bad_streams() {
    let parsed = parse(RawPlaylistInput::Manifest(MANIFEST)).unwrap();
    assert_eq!(parsed.entry_count(), 3);
    assert_eq!(parsed.skipped, 1);

    let settings = Settings::default()
        .merged_with(parsed.settings.as_ref().unwrap())
        .unwrap();
    assert_eq!(settings.default_volume, 0.8);
    assert_eq!(settings.backup_grace_period, 5000);
}

#[test]
fn test_manifest_invalid_json_is_error() {
    assert!(parse(RawPlaylistInput::Manifest("{not json")).is_err());
    assert!(parse(RawPlaylistInput::Manifest("[]")).is_err());
}

#[test]
fn test_m3u_entries_stamped_with_category() {
    let tv = Category::Tv;
    let parsed = parse(RawPlaylistInput::M3u {
        text: M3U,
        category: &tv,
        source: "channels.m3u",
    })
    .unwrap();

    let entries: Vec<_> = parsed.entries().collect();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.category == Category::Tv));
    assert_eq!(entries[0].name, "Channel One");
    assert_eq!(entries[0].metadata.logo.as_deref(), Some("https://img/one.png"));
    assert_eq!(entries[0].metadata.group.as_deref(), Some("News"));
    assert_eq!(entries[1].url, "https://tv/two.m3u8");
}

#[test]
fn test_catalog_from_mixed_sources_is_deterministic() {
    let build = || {
        let tv = Category::Tv;
        let mut blocks = parse(RawPlaylistInput::Manifest(MANIFEST)).unwrap().categories;
        blocks.extend(
            parse(RawPlaylistInput::M3u {
                text: M3U,
                category: &tv,
                source: "channels.m3u",
            })
            .unwrap()
            .categories,
        );
        Catalog::load(blocks)
    };

    let catalog = build();
    assert_eq!(catalog, build());

    assert_eq!(catalog.stats().count(&Category::Radio), 2);
    assert_eq!(catalog.stats().count(&Category::Tv), 3);
    assert_eq!(catalog.get(&Category::Radio, 0).unwrap().id, "test-fm");
    assert_eq!(catalog.info(&Category::Radio).unwrap().color, "#ff0000");

    let mut ids: Vec<_> = catalog.entries().map(|e| e.id.clone()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);

    assert!(matches!(
        catalog.get(&Category::Radio, 5),
        Err(Error::NotFound { .. })
    ));
}

// =============================================================================
// Playback Tests
// =============================================================================

struct ScriptedPipeline {
    loads: mpsc::UnboundedSender<(Instant, String, LoadToken)>,
}

impl MediaPipeline for ScriptedPipeline {
    fn is_supported(&self) -> bool {
        true
    }

    fn attach(&mut self, _events: PipelineEvents) {}

    fn load_source(&mut self, url: &str, token: LoadToken) {
        let _ = self.loads.send((Instant::now(), url.to_string(), token));
    }

    fn start_load(&mut self) {}

    fn stop_load(&mut self) {}

    fn recover_media_error(&mut self) {}

    fn destroy(&mut self) {}
}

fn spawn_session() -> (
    streambank_core::SessionHandle,
    mpsc::UnboundedReceiver<(Instant, String, LoadToken)>,
) {
    let catalog = Catalog::load(parse(RawPlaylistInput::Manifest(MANIFEST)).unwrap().categories);
    let (tx, rx) = mpsc::unbounded_channel();
    let session = PlaybackSession::new(
        PlaybackConfig::default(),
        CatalogStore::new(catalog),
        ScriptedPipeline { loads: tx },
    );
    let handle = session.handle();
    tokio::spawn(session.run());
    (handle, rx)
}

fn within(actual: Duration, expected: Duration) -> bool {
    actual >= expected && actual < expected + Duration::from_millis(100)
}

#[tokio::test(start_paused = true)]
async fn test_full_failover_scenario() {
    let (handle, mut loads) = spawn_session();
    let events = handle.pipeline_events();
    let mut notices = handle.subscribe_notices();

    let entry = handle.select("radio", 0).await.unwrap();
    assert_eq!(entry.name, "Test FM");

    let (mut last_at, url, mut token) = loads.recv().await.unwrap();
    assert_eq!(url, "https://a/x.m3u8");
    assert_eq!(handle.snapshot().state, PlaybackState::Loading);

    // Three reconnects on the primary, 1s, 2s and 3s apart
    for attempt in 1..=3u64 {
        events.error(token, PipelineErrorKind::Network, true);
        let (at, url, next) = loads.recv().await.unwrap();
        assert_eq!(url, "https://a/x.m3u8");
        assert!(within(at - last_at, Duration::from_secs(attempt)));
        last_at = at;
        token = next;
    }

    // Budget spent: first backup
    events.error(token, PipelineErrorKind::Network, true);
    let (at, url, backup_token) = loads.recv().await.unwrap();
    assert_eq!(url, "https://b/x.m3u8");
    assert!(at - last_at < Duration::from_millis(100));
    assert_eq!(notices.recv().await.unwrap().code, "BACKUP");

    // The backup stays silent: grace check moves on
    let (silent_at, url, last_token) = loads.recv().await.unwrap();
    assert_eq!(url, "https://c/x.m3u8");
    assert!(within(silent_at - at, Duration::from_secs(5)));
    assert_eq!(notices.recv().await.unwrap().code, "BACKUP");

    // A late error from the abandoned backup changes nothing
    events.error(backup_token, PipelineErrorKind::Other, true);
    tokio::task::yield_now().await;
    assert_eq!(handle.snapshot().active_url.as_deref(), Some("https://c/x.m3u8"));

    events.error(last_token, PipelineErrorKind::Other, true);
    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.code, "SOURCES_EXHAUSTED");
    assert!(notice.terminal);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Failed);
    assert_eq!(snapshot.active_url.as_deref(), Some("https://a/x.m3u8"));
    assert!(loads.try_recv().is_err());

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_ready_then_reselect() {
    let (handle, mut loads) = spawn_session();
    let events = handle.pipeline_events();
    let mut states = handle.subscribe_state();

    handle.select("radio", 1).await.unwrap();
    let (_, url, first) = loads.recv().await.unwrap();
    assert_eq!(url, "https://jazz/live.m3u8");

    events.ready(first);
    states
        .wait_for(|s| s.state == PlaybackState::Playing)
        .await
        .unwrap();

    handle.select("tv", 0).await.unwrap();
    let (_, url, second) = loads.recv().await.unwrap();
    assert_eq!(url, "https://tv/one.m3u8");
    assert!(second > first);

    // Ready from the superseded load is ignored
    events.ready(first);
    tokio::task::yield_now().await;
    assert_eq!(handle.snapshot().state, PlaybackState::Loading);

    handle.stop().await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.current_entry.unwrap().name, "Channel One");
    assert!(snapshot.active_url.is_none());

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_non_network_failures_cascade_in_order() {
    let (handle, mut loads) = spawn_session();
    let events = handle.pipeline_events();
    let mut states = handle.subscribe_state();

    handle.select("radio", 0).await.unwrap();

    let mut urls = Vec::new();
    for _ in 0..3 {
        let (_, url, token) = loads.recv().await.unwrap();
        urls.push(url);
        events.error(token, PipelineErrorKind::Other, true);
    }
    assert_eq!(urls, vec!["https://a/x.m3u8", "https://b/x.m3u8", "https://c/x.m3u8"]);

    let failed = states
        .wait_for(|s| s.state == PlaybackState::Failed)
        .await
        .unwrap()
        .clone();
    assert_eq!(failed.active_url.as_deref(), Some("https://a/x.m3u8"));
    assert!(failed.error.is_some());

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_backup_plays_after_primary_failure() {
    let manifest = r#"{"categories":{"radio":{"streams":[
        {"name":"Test FM","url":"https://a/x.m3u8","backupUrls":["https://b/x.m3u8"]}
    ]}}}"#;
    let catalog = Catalog::load(parse(RawPlaylistInput::Manifest(manifest)).unwrap().categories);
    let (tx, mut loads) = mpsc::unbounded_channel();
    let session = PlaybackSession::new(
        PlaybackConfig::default(),
        CatalogStore::new(catalog),
        ScriptedPipeline { loads: tx },
    );
    let handle = session.handle();
    let events = handle.pipeline_events();
    let mut states = handle.subscribe_state();
    tokio::spawn(session.run());

    handle.select("radio", 0).await.unwrap();
    let (_, _, primary) = loads.recv().await.unwrap();
    events.error(primary, PipelineErrorKind::Other, true);

    let (_, url, backup) = loads.recv().await.unwrap();
    assert_eq!(url, "https://b/x.m3u8");
    events.ready(backup);

    let playing = states
        .wait_for(|s| s.state == PlaybackState::Playing)
        .await
        .unwrap()
        .clone();
    assert_eq!(playing.active_url.as_deref(), Some("https://b/x.m3u8"));

    // Once playing, the grace check never moves it along
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.snapshot().state, PlaybackState::Playing);
    assert!(loads.try_recv().is_err());

    handle.shutdown();
}

#[tokio::test]
async fn test_select_unknown_entry_over_handle() {
    let (handle, mut loads) = spawn_session();

    let err = handle.select("podcast", 0).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(handle.snapshot().state, PlaybackState::Idle);
    assert!(loads.try_recv().is_err());

    let err = handle.advance_backup().await.unwrap_err();
    assert!(matches!(err, Error::NoAlternativeSource));

    handle.shutdown();
}

#[tokio::test]
async fn test_select_by_id_over_handle() {
    let (handle, mut loads) = spawn_session();

    let entry = handle.select_by_id("test-fm").await.unwrap();
    assert_eq!(entry.name, "Test FM");
    let (_, url, _) = loads.recv().await.unwrap();
    assert_eq!(url, "https://a/x.m3u8");

    let err = handle.select_by_id("missing").await.unwrap_err();
    assert!(matches!(err, Error::UnknownEntry(_)));
    assert_eq!(handle.snapshot().current_entry.unwrap().id, "test-fm");

    handle.shutdown();
}
