//! Pipeline execution implementation.

use super::{
    millis, ProbeRecord, ProbeSummary, ProbeTimings, ALGORITHM, IMAGE_RESIZE, SUMMARY_TOP_PAIRS,
};
use crate::core::cluster::DEFAULT_THRESHOLD;
use crate::core::comparator::{compare_all, top_pairs, PairWriter, SimilarityPair};
use crate::core::fetcher::{fetch_content, ContentFetcher};
use crate::core::hasher::{fingerprint_content, Fingerprint, HASH_BITS};
use crate::core::media::MediaItem;
use crate::error::{ClusterEngineError, ProcessingFailure, ReportError};
use crate::events::{
    null_sender, CompareEvent, Event, EventSender, FingerprintEvent, FingerprintProgress,
    PipelineEvent, PipelinePhase, PipelineSummary,
};
use rayon::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Result of a probe run
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Fingerprints of the hashed items, in input order
    pub fingerprints: Vec<Fingerprint>,
    /// Every evaluated pair, in ranking order
    pub pairs: Vec<SimilarityPair>,
    /// Summary for the run descriptor
    pub summary: ProbeSummary,
}

/// Files written by [`Pipeline::run_to_dir`]
#[derive(Debug, Clone)]
pub struct ProbeArtifacts {
    pub similarity_path: PathBuf,
    pub run_path: PathBuf,
}

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Threshold recorded as `near_match_threshold`
    pub threshold: u8,
    /// Worker threads; `None` uses rayon's default
    pub workers: Option<usize>,
    /// Pairs kept in the summary
    pub summary_pairs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            workers: None,
            summary_pairs: SUMMARY_TOP_PAIRS,
        }
    }
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    fetcher: Option<Box<dyn ContentFetcher>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            fetcher: None,
        }
    }

    /// Set the content fetcher
    pub fn fetcher(mut self, fetcher: Box<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set the near-match threshold
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.config.threshold = threshold.min(100);
        self
    }

    /// Set the number of worker threads
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = Some(workers).filter(|&n| n > 0);
        self
    }

    /// Set how many pairs the summary keeps
    pub fn summary_pairs(mut self, n: usize) -> Self {
        self.config.summary_pairs = n;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline, ClusterEngineError> {
        let fetcher = self
            .fetcher
            .ok_or_else(|| ClusterEngineError::Config("no content fetcher configured".into()))?;

        let mut pool = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = self.config.workers {
            pool = pool.num_threads(workers);
        }
        let pool = pool
            .build()
            .map_err(|e| ClusterEngineError::Config(format!("worker pool: {}", e)))?;

        Ok(Pipeline {
            config: self.config,
            fetcher,
            pool,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The similarity probe pipeline
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Box<dyn ContentFetcher>,
    pool: rayon::ThreadPool,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline without events
    pub fn run(&self, items: &[MediaItem]) -> ProbeOutcome {
        self.run_with_events(items, &null_sender())
    }

    /// Run the pipeline with event reporting
    pub fn run_with_events(&self, items: &[MediaItem], events: &EventSender) -> ProbeOutcome {
        let start_time = Instant::now();
        let outcome = self.execute(items, events);
        send_completed(events, &outcome, start_time);
        outcome
    }

    /// Run the pipeline and write `<out>/<runId>-similarity.ndjson` and
    /// `<out>/<runId>-run.json`
    pub fn run_to_dir(
        &self,
        items: &[MediaItem],
        out_dir: &Path,
        run_id: &str,
        events: &EventSender,
    ) -> Result<(ProbeOutcome, ProbeArtifacts), ClusterEngineError> {
        let start_time = Instant::now();
        let outcome = self.execute(items, events);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Writing,
        }));
        let artifacts = outcome.write(out_dir, run_id)?;

        send_completed(events, &outcome, start_time);
        Ok((outcome, artifacts))
    }

    fn execute(&self, items: &[MediaItem], events: &EventSender) -> ProbeOutcome {
        events.send(Event::Pipeline(PipelineEvent::Started));

        // Phase 1: Fingerprinting
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Fingerprinting,
        }));
        events.send(Event::Fingerprint(FingerprintEvent::Started {
            total_items: items.len(),
        }));
        tracing::info!(items = items.len(), "fingerprinting items");

        let total = items.len();
        let completed = AtomicUsize::new(0);

        let results: Vec<(Result<Fingerprint, ProcessingFailure>, ProbeTimings)> =
            self.pool.install(|| {
                items
                    .par_iter()
                    .map(|item| {
                        let result = self.process_item(item);
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                        if let Err(failure) = &result.0 {
                            tracing::warn!(
                                id = %failure.item_id,
                                reason = %failure.reason,
                                detail = %failure.detail,
                                "item skipped"
                            );
                            events.send(Event::Fingerprint(FingerprintEvent::Failed(
                                failure.clone(),
                            )));
                        }
                        events.send(Event::Fingerprint(FingerprintEvent::Progress(
                            FingerprintProgress {
                                completed: done,
                                total,
                                current_id: item.id.clone(),
                            },
                        )));
                        result
                    })
                    .collect()
            });

        let mut timings = ProbeTimings::default();
        let mut fingerprints = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (result, item_timings) in results {
            timings = timings.merge(item_timings);
            match result {
                Ok(fingerprint) => fingerprints.push(fingerprint),
                Err(failure) => failures.push(failure),
            }
        }

        events.send(Event::Fingerprint(FingerprintEvent::Completed {
            hashed: fingerprints.len(),
            failed: failures.len(),
        }));

        // Phase 2: Comparing
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Comparing,
        }));
        events.send(Event::Compare(CompareEvent::Started {
            total_fingerprints: fingerprints.len(),
        }));

        let compare_start = Instant::now();
        let pairs = compare_all(&fingerprints);
        timings.comparison_ms = millis(compare_start.elapsed());

        events.send(Event::Compare(CompareEvent::Completed {
            pairs_evaluated: pairs.len(),
        }));
        tracing::info!(
            hashed = fingerprints.len(),
            failed = failures.len(),
            pairs = pairs.len(),
            "comparison finished"
        );

        let summary = ProbeSummary {
            algorithm: ALGORITHM.to_string(),
            hash_bits: HASH_BITS,
            image_resize: IMAGE_RESIZE.to_string(),
            near_match_threshold: self.config.threshold,
            items_total: items.len(),
            items_hashed: fingerprints.len(),
            pairs_evaluated: pairs.len(),
            top_pairs: top_pairs(&pairs, self.config.summary_pairs),
            failures,
            timing_ms: timings,
        };

        ProbeOutcome {
            fingerprints,
            pairs,
            summary,
        }
    }

    /// Fetch, decode and hash one item, timing the fetch and the hash
    fn process_item(&self, item: &MediaItem) -> (Result<Fingerprint, ProcessingFailure>, ProbeTimings) {
        let fetch_start = Instant::now();
        let fetched = fetch_content(self.fetcher.as_ref(), item);
        let mut timings = ProbeTimings {
            download_ms: millis(fetch_start.elapsed()),
            ..ProbeTimings::default()
        };

        let content = match fetched {
            Ok(content) => content,
            Err(failure) => return (Err(failure), timings),
        };

        let hash_start = Instant::now();
        let result = fingerprint_content(&item.id, &content);
        timings.hashing_ms = millis(hash_start.elapsed());

        if let Ok(fingerprint) = &result {
            tracing::debug!(id = %item.id, hash = %fingerprint.hash_hex, "hashed");
        }
        (result, timings)
    }
}

fn send_completed(events: &EventSender, outcome: &ProbeOutcome, start_time: Instant) {
    events.send(Event::Pipeline(PipelineEvent::Completed {
        summary: PipelineSummary {
            total_items: outcome.summary.items_total,
            hashed_items: outcome.summary.items_hashed,
            failed_items: outcome.summary.failures.len(),
            pairs_evaluated: outcome.summary.pairs_evaluated,
            duration_ms: millis(start_time.elapsed()),
        },
    }));
}

impl ProbeOutcome {
    /// Write the similarity NDJSON and run descriptor for `run_id`
    pub fn write(&self, out_dir: &Path, run_id: &str) -> Result<ProbeArtifacts, ReportError> {
        fs::create_dir_all(out_dir).map_err(|source| ReportError::Write {
            path: out_dir.to_path_buf(),
            source,
        })?;

        let similarity_path = out_dir.join(format!("{}-similarity.ndjson", run_id));
        let write_err = |source| ReportError::Write {
            path: similarity_path.clone(),
            source,
        };
        let file = File::create(&similarity_path).map_err(write_err)?;
        let mut writer = PairWriter::new(file);
        writer.write_pairs(&self.pairs).map_err(write_err)?;
        writer.finish().map_err(write_err)?;

        let run_path = out_dir.join(format!("{}-run.json", run_id));
        let record = ProbeRecord {
            run_id: run_id.to_string(),
            similarity_probe: self.summary.clone(),
        };
        let json = serde_json::to_string_pretty(&record).map_err(|source| {
            ReportError::Serialize {
                what: "run descriptor",
                source,
            }
        })?;
        fs::write(&run_path, json).map_err(|source| ReportError::Write {
            path: run_path.clone(),
            source,
        })?;

        tracing::info!(
            similarity = %similarity_path.display(),
            run = %run_path.display(),
            "probe outputs written"
        );

        Ok(ProbeArtifacts {
            similarity_path,
            run_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::{read_similarity, RunDescriptor};
    use crate::error::{FailureReason, FetchError};
    use crate::events::EventChannel;
    use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct MapFetcher {
        bodies: HashMap<String, Vec<u8>>,
    }

    impl ContentFetcher for MapFetcher {
        fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>, FetchError> {
            self.bodies
                .get(&item.id)
                .cloned()
                .ok_or(FetchError::Status { status: 404 })
        }

        fn name(&self) -> &'static str {
            "map"
        }
    }

    fn gradient_png(reverse: bool) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_fn(36, 16, |x, _| {
            let v = (x * 7) as u8;
            Rgb(if reverse { [255 - v; 3] } else { [v; 3] })
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn fixture_pipeline() -> (Pipeline, Vec<MediaItem>) {
        let mut bodies = HashMap::new();
        bodies.insert("a".to_string(), gradient_png(false));
        bodies.insert("b".to_string(), gradient_png(false));
        bodies.insert("c".to_string(), gradient_png(true));
        bodies.insert("broken".to_string(), b"garbage".to_vec());

        let items = vec![
            MediaItem::new("c", Some("image/png")),
            MediaItem::new("a", Some("image/png")),
            MediaItem::new("video", Some("video/mp4")),
            MediaItem::new("b", Some("image/png")),
            MediaItem::new("broken", Some("image/png")),
            MediaItem::new("gone", Some("image/jpeg")),
        ];

        let pipeline = Pipeline::builder()
            .fetcher(Box::new(MapFetcher { bodies }))
            .workers(2)
            .build()
            .unwrap();
        (pipeline, items)
    }

    #[test]
    fn builder_requires_a_fetcher() {
        assert!(matches!(
            Pipeline::builder().build(),
            Err(ClusterEngineError::Config(_))
        ));
    }

    #[test]
    fn builder_sets_threshold() {
        let pipeline = Pipeline::builder()
            .fetcher(Box::new(MapFetcher {
                bodies: HashMap::new(),
            }))
            .threshold(85)
            .build()
            .unwrap();
        assert_eq!(pipeline.config().threshold, 85);
    }

    #[test]
    fn fingerprints_keep_input_order() {
        let (pipeline, items) = fixture_pipeline();
        let outcome = pipeline.run(&items);

        let ids: Vec<&str> = outcome
            .fingerprints
            .iter()
            .map(|f| f.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn failures_are_collected_per_item() {
        let (pipeline, items) = fixture_pipeline();
        let outcome = pipeline.run(&items);

        let reasons: HashMap<&str, FailureReason> = outcome
            .summary
            .failures
            .iter()
            .map(|f| (f.item_id.as_str(), f.reason))
            .collect();
        assert_eq!(reasons.len(), 3);
        assert_eq!(reasons["video"], FailureReason::UnsupportedMimeType);
        assert_eq!(reasons["broken"], FailureReason::DecodeFailed);
        assert_eq!(reasons["gone"], FailureReason::DownloadFailed);
    }

    #[test]
    fn identical_images_rank_first() {
        let (pipeline, items) = fixture_pipeline();
        let outcome = pipeline.run(&items);

        assert_eq!(outcome.summary.items_total, 6);
        assert_eq!(outcome.summary.items_hashed, 3);
        assert_eq!(outcome.summary.pairs_evaluated, 3);
        let best = &outcome.pairs[0];
        assert_eq!((best.id_a.as_str(), best.id_b.as_str()), ("a", "b"));
        assert_eq!(best.similarity_percent, 100);
        assert_eq!(outcome.summary.top_pairs, outcome.pairs);
    }

    #[test]
    fn events_report_every_item() {
        let (pipeline, items) = fixture_pipeline();
        let (sender, receiver) = EventChannel::new();
        pipeline.run_with_events(&items, &sender);
        drop(sender);

        let events: Vec<Event> = receiver.iter().collect();
        let progress = events
            .iter()
            .filter(|e| matches!(e, Event::Fingerprint(FingerprintEvent::Progress(_))))
            .count();
        assert_eq!(progress, items.len());
        assert!(matches!(
            events.last(),
            Some(Event::Pipeline(PipelineEvent::Completed { .. }))
        ));
    }

    #[test]
    fn writes_readable_outputs() {
        let dir = TempDir::new().unwrap();
        let (pipeline, items) = fixture_pipeline();
        let (outcome, artifacts) = pipeline
            .run_to_dir(&items, dir.path(), "run-7", &null_sender())
            .unwrap();

        assert_eq!(artifacts.similarity_path, dir.path().join("run-7-similarity.ndjson"));
        assert_eq!(artifacts.run_path, dir.path().join("run-7-run.json"));

        let descriptor = RunDescriptor::load(&artifacts.run_path).unwrap();
        assert_eq!(descriptor.run_id.as_deref(), Some("run-7"));
        assert_eq!(descriptor.hash_bits(), Some(64));
        assert_eq!(descriptor.failures(), outcome.summary.failures);

        let pairs = read_similarity(&artifacts.similarity_path, descriptor.hash_bits()).unwrap();
        assert_eq!(pairs, outcome.pairs);
    }
}
