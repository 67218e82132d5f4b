//! # Core Module
//!
//! The near-duplicate clustering engine, free of any CLI concerns.
//!
//! ## Modules
//! - `media` - Media items and their decoder kind
//! - `fetcher` - Downloads (or serves fixture) image bytes per item
//! - `hasher` - Decodes images and computes 64-bit dHash fingerprints
//! - `comparator` - Scores every pair of fingerprints
//! - `cluster` - Union-find clustering and representative election
//! - `ingest` - Reads item, similarity and run descriptor inputs
//! - `pipeline` - Orchestrates a similarity probe over a batch
//! - `reporter` - Joins clusters with metadata and writes reports

pub mod cluster;
pub mod comparator;
pub mod fetcher;
pub mod hasher;
pub mod ingest;
pub mod media;
pub mod pipeline;
pub mod reporter;

// Re-export commonly used types
pub use cluster::{build_clusters, Cluster, ClusterOptions, Clustering};
pub use comparator::{PairKey, SimilarityPair};
pub use fetcher::{ContentFetcher, FetchConfig, FixtureFetcher, HttpFetcher};
pub use hasher::Fingerprint;
pub use media::{ImageKind, MediaItem};
pub use pipeline::{Pipeline, ProbeSummary, ProbeTimings};
pub use reporter::{generate_report, Report, ReportPaths, ReportRequest};
