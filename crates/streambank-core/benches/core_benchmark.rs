//! Benchmark tests for streambank-core operations
//!
//! Run with: cargo bench -p streambank-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use streambank_core::playlist::ExtInf;
use streambank_core::{parse, Catalog, Category, RawPlaylistInput};

// ============================================================================
// Helpers
// ============================================================================

fn m3u_playlist(entries: usize) -> String {
    let mut text = String::from("#EXTM3U\n");
    for i in 0..entries {
        text.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"ch{i}\" tvg-logo=\"https://img.example.com/{i}.png\" group-title=\"Group {g}\",Channel {i}\n",
            g = i % 10
        ));
        text.push_str(&format!("https://cdn.example.com/live/{i}/index.m3u8\n"));
    }
    text
}

fn manifest(entries: usize) -> String {
    let streams: Vec<String> = (0..entries)
        .map(|i| {
            format!(
                r#"{{"name": "Station {i}", "url": "https://a.example.com/{i}.m3u8", "backupUrls": ["https://b.example.com/{i}.m3u8"], "genre": "Pop"}}"#
            )
        })
        .collect();
    format!(r#"{{"categories": {{"radio": {{"streams": [{}]}}}}}}"#, streams.join(","))
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_extinf(c: &mut Criterion) {
    let line = "#EXTINF:-1 tvg-id=\"one\" tvg-name=\"Channel One\" tvg-logo=\"https://img/one.png\" group-title=\"News\",Channel One HD";
    c.bench_function("extinf_parse", |b| b.iter(|| ExtInf::parse(black_box(line))));
}

fn bench_m3u(c: &mut Criterion) {
    let mut group = c.benchmark_group("m3u_parse");
    let category = Category::Tv;
    for size in [100, 1_000, 10_000] {
        let text = m3u_playlist(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| {
                parse(RawPlaylistInput::M3u {
                    text: black_box(text),
                    category: &category,
                    source: "bench.m3u",
                })
            })
        });
    }
    group.finish();
}

fn bench_manifest(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_parse");
    for size in [100, 1_000] {
        let text = manifest(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| parse(RawPlaylistInput::Manifest(black_box(text))))
        });
    }
    group.finish();
}

fn bench_catalog(c: &mut Criterion) {
    let category = Category::Tv;
    let parsed = parse(RawPlaylistInput::M3u {
        text: &m3u_playlist(5_000),
        category: &category,
        source: "bench.m3u",
    })
    .unwrap();

    c.bench_function("catalog_load_5000", |b| {
        b.iter(|| Catalog::load(black_box(parsed.categories.clone())))
    });

    let catalog = Catalog::load(parsed.categories.clone());
    c.bench_function("catalog_get", |b| {
        b.iter(|| catalog.get(black_box(&category), black_box(4_321)))
    });
}

criterion_group!(benches, bench_extinf, bench_m3u, bench_manifest, bench_catalog);
criterion_main!(benches);
