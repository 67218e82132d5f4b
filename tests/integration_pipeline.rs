//! Integration tests for the probe pipeline and the report built from it.
//!
//! These tests verify end-to-end behavior including:
//! - Fixture-backed fetching of PNG and JPEG content
//! - Per-item failures that do not abort the run
//! - Clustering and report artifacts produced from probe outputs

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use photo_cluster::core::cluster::ClusterOptions;
use photo_cluster::core::fetcher::FixtureFetcher;
use photo_cluster::core::ingest::read_items;
use photo_cluster::core::pipeline::Pipeline;
use photo_cluster::core::reporter::{generate_report, ReportRequest};
use photo_cluster::events::null_sender;
use photo_cluster::FailureReason;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn save(image: &RgbImage, path: &Path, format: ImageFormat) {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    fs::write(path, out.into_inner()).unwrap();
}

fn gradient(brighten: u8, reverse: bool) -> RgbImage {
    ImageBuffer::from_fn(144, 64, |x, _| {
        let v = (x * 255 / 143) as u8;
        let v = if reverse { 255 - v } else { v };
        Rgb([v.saturating_add(brighten); 3])
    })
}

fn stripes() -> RgbImage {
    ImageBuffer::from_fn(144, 64, |x, _| {
        if (x / 16) % 2 == 0 {
            Rgb([240, 240, 240])
        } else {
            Rgb([20, 20, 20])
        }
    })
}

/// Lay out fixtures and an items file; returns the items path
fn setup(dir: &Path) -> std::path::PathBuf {
    let fixtures = dir.join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();

    save(&gradient(0, false), &fixtures.join("sunrise.png"), ImageFormat::Png);
    save(&gradient(10, false), &fixtures.join("sunrise-copy.png"), ImageFormat::Png);
    save(&gradient(0, false), &fixtures.join("sunrise-jpeg.jpg"), ImageFormat::Jpeg);
    save(&gradient(0, true), &fixtures.join("sunset.png"), ImageFormat::Png);
    save(&stripes(), &fixtures.join("stripes.png"), ImageFormat::Png);

    let lines = [
        r#"{"id":"sunrise","mediaFile":{"mimeType":"image/png","filename":"sunrise.png","mediaFileMetadata":{"width":144,"height":64}}}"#,
        r#"{"id":"sunrise-copy","mediaFile":{"mimeType":"image/png","filename":"sunrise (1).png"}}"#,
        r#"{"id":"sunrise-jpeg","mediaFile":{"mimeType":"image/jpeg","filename":"sunrise.jpg"},"createTime":"2024-05-01T08:00:00Z"}"#,
        r#"{"id":"sunset","mediaFile":{"mimeType":"image/png"}}"#,
        r#"{"id":"stripes","mediaFile":{"mimeType":"image/png"}}"#,
        r#"{"id":"clip","mediaFile":{"mimeType":"video/mp4"}}"#,
        "",
        r#"{"id":"missing","mediaFile":{"mimeType":"image/png"}}"#,
    ];
    let items_path = dir.join("items.ndjson");
    fs::write(&items_path, lines.join("\n")).unwrap();
    items_path
}

fn probe(dir: &Path) -> Pipeline {
    Pipeline::builder()
        .fetcher(Box::new(FixtureFetcher::new(dir.join("fixtures")).strict(true)))
        .workers(2)
        .build()
        .unwrap()
}

#[test]
fn probe_hashes_fixtures_and_records_failures() {
    let temp_dir = TempDir::new().unwrap();
    let items_path = setup(temp_dir.path());
    let items = read_items(&items_path).unwrap();
    assert_eq!(items.len(), 7);

    let pipeline = probe(temp_dir.path());
    let outcome = pipeline.run(&items);

    assert_eq!(outcome.summary.items_total, 7);
    assert_eq!(outcome.summary.items_hashed, 5);
    assert_eq!(outcome.summary.pairs_evaluated, 10);
    assert_eq!(outcome.summary.top_pairs.len(), 10);
    assert_eq!(outcome.summary.algorithm, "dhash");
    assert_eq!(outcome.summary.image_resize, "w512-h512->9x8");

    let by_id = |id: &str| {
        outcome
            .fingerprints
            .iter()
            .find(|f| f.item_id == id)
            .unwrap()
            .hash_hex
            .clone()
    };
    // Left-to-right brightening never sets a bit; darkening sets them all
    assert_eq!(by_id("sunrise"), "0000000000000000");
    assert_eq!(by_id("sunrise-copy"), "0000000000000000");
    assert_eq!(by_id("sunrise-jpeg"), "0000000000000000");
    assert_eq!(by_id("sunset"), "ffffffffffffffff");
    assert_eq!(by_id("stripes"), "aaaaaaaaaaaaaaaa");

    let failures = &outcome.summary.failures;
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].item_id, "clip");
    assert_eq!(failures[0].reason, FailureReason::UnsupportedMimeType);
    assert_eq!(failures[1].item_id, "missing");
    assert_eq!(failures[1].reason, FailureReason::DownloadFailed);
}

#[test]
fn report_clusters_probe_output() {
    let temp_dir = TempDir::new().unwrap();
    let items_path = setup(temp_dir.path());
    let items = read_items(&items_path).unwrap();
    let out = temp_dir.path().join("reports");

    let pipeline = probe(temp_dir.path());
    let (_, artifacts) = pipeline
        .run_to_dir(&items, &out, "batch-1", &null_sender())
        .unwrap();

    let request = ReportRequest {
        items_path: items_path.clone(),
        similarity_path: artifacts.similarity_path.clone(),
        run_path: artifacts.run_path.clone(),
        out_dir: out.clone(),
        run_id: None,
        clustering: ClusterOptions::new().threshold(70).top_pairs(0),
    };
    let (report, paths) = generate_report(&request).unwrap();

    assert_eq!(report.run_id, "batch-1");
    assert_eq!(report.clusters.len(), 1);
    let cluster = &report.clusters[0];
    let ids: Vec<&str> = cluster.members.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["sunrise", "sunrise-copy", "sunrise-jpeg"]);
    assert_eq!(cluster.representative_id, "sunrise");
    assert_eq!(cluster.members[0].dimensions.as_deref(), Some("144x64"));
    assert_eq!(cluster.members[2].filename.as_deref(), Some("sunrise.jpg"));
    assert!(cluster.members[2].create_time.is_some());

    assert_eq!(report.counters.items, 7);
    assert_eq!(report.counters.excluded_singles, 4);
    assert_eq!(report.failures.len(), 2);
    assert!(report.timing_ms.is_some());

    assert_eq!(paths.report_dir, out.join("batch-1").join("report"));
    let clusters: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.clusters_json).unwrap()).unwrap();
    assert_eq!(clusters.as_array().unwrap().len(), 1);
    assert_eq!(clusters[0]["representative_id"], "sunrise");
}

#[test]
fn top_pairs_force_merges_below_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let items_path = setup(temp_dir.path());
    let items = read_items(&items_path).unwrap();
    let out = temp_dir.path().join("reports");

    let pipeline = probe(temp_dir.path());
    let (_, artifacts) = pipeline
        .run_to_dir(&items, &out, "batch-2", &null_sender())
        .unwrap();

    let request = ReportRequest {
        items_path,
        similarity_path: artifacts.similarity_path,
        run_path: artifacts.run_path,
        out_dir: out,
        run_id: Some("override".to_string()),
        clustering: ClusterOptions::new(),
    };
    let (report, paths) = generate_report(&request).unwrap();

    // Default topPairs covers all ten pairs, so every hashed item joins
    assert_eq!(report.run_id, "override");
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].size, 5);
    assert!(paths.clusters_json.ends_with("override/clusters.json"));
}

#[test]
fn report_is_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    let items_path = setup(temp_dir.path());
    let items = read_items(&items_path).unwrap();
    let out = temp_dir.path().join("reports");

    let pipeline = probe(temp_dir.path());
    let (_, artifacts) = pipeline
        .run_to_dir(&items, &out, "batch-3", &null_sender())
        .unwrap();

    let run = |run_id: &str| {
        let request = ReportRequest {
            items_path: items_path.clone(),
            similarity_path: artifacts.similarity_path.clone(),
            run_path: artifacts.run_path.clone(),
            out_dir: out.clone(),
            run_id: Some(run_id.to_string()),
            clustering: ClusterOptions::new().top_pairs(0),
        };
        let (_, paths) = generate_report(&request).unwrap();
        (
            fs::read_to_string(paths.clusters_json).unwrap(),
            fs::read_to_string(paths.index_html).unwrap(),
        )
    };

    assert_eq!(run("same"), run("same"));
}
