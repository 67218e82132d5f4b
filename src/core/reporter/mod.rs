//! # Reporter Module
//!
//! Turns a clustering result into the artifacts people review.
//!
//! Clusters are joined with item metadata (filename, content URL,
//! dimensions, capture time) so a reviewer can tell at a glance what each
//! member is and why the representative was picked.
//!
//! ## Outputs
//! - `report/report.json` - the full [`Report`]
//! - `report/index.html` - human-readable cluster listing
//! - `report/clusters.csv` - one row per cluster member
//! - `clusters.json` - compact cluster list for downstream tools

mod export;

pub use export::{
    export_clusters_json, export_csv, export_html, write_report, ReportPaths,
};

use crate::core::cluster::{build_clusters, Cluster, ClusterOptions, SimilarityStats};
use crate::core::comparator::SimilarityPair;
use crate::core::hasher::HASH_BITS;
use crate::core::ingest::{infer_run_id, read_items, read_similarity, RunDescriptor};
use crate::core::media::MediaItem;
use crate::core::pipeline::ProbeTimings;
use crate::error::{ProcessingFailure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Parameters of a report run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub clustering: ClusterOptions,
    /// Bits per hash, used when describing pairs
    pub hash_bits: u32,
}

impl ReportOptions {
    pub fn new(clustering: ClusterOptions) -> Self {
        Self {
            clustering,
            hash_bits: HASH_BITS,
        }
    }

    pub fn hash_bits(mut self, bits: u32) -> Self {
        self.hash_bits = bits;
        self
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::new(ClusterOptions::default())
    }
}

/// Parameters echoed into the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportParameters {
    pub threshold: u8,
    pub top_pairs: usize,
    pub include_singles: bool,
    pub hash_bits: u32,
}

/// Headline numbers for a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportCounters {
    pub items: usize,
    pub pairs: usize,
    pub clusters: usize,
    pub clustered_items: usize,
    pub excluded_singles: usize,
    pub unknown_item_references: usize,
    pub pairs_merged: usize,
    pub pairs_forced: usize,
    pub failures: usize,
}

/// One cluster member with resolved metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReport {
    pub id: String,
    pub filename: Option<String>,
    pub content_url: Option<String>,
    pub mime_type: Option<String>,
    /// `WxH`
    pub dimensions: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    /// Total similarity to the rest of the cluster
    pub score: u32,
    pub is_representative: bool,
}

/// A cluster as shown in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub cluster_id: String,
    pub representative_id: String,
    pub size: usize,
    pub similarity: SimilarityStats,
    pub members: Vec<MemberReport>,
}

impl ClusterReport {
    pub fn representative(&self) -> Option<&MemberReport> {
        self.members.iter().find(|m| m.is_representative)
    }
}

/// The complete, write-once report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub parameters: ReportParameters,
    pub counters: ReportCounters,
    pub clusters: Vec<ClusterReport>,
    /// Highest-ranked pairs that clustering considered, `parameters.top_pairs` at most
    pub top_pairs: Vec<SimilarityPair>,
    pub failures: Vec<ProcessingFailure>,
    pub timing_ms: Option<ProbeTimings>,
}

/// Inputs gathered for one report run
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub run_id: String,
    pub items: Vec<MediaItem>,
    pub pairs: Vec<SimilarityPair>,
    pub failures: Vec<ProcessingFailure>,
    pub timings: Option<ProbeTimings>,
}

/// Cluster the items and join the result with item metadata.
///
/// Returns the report together with the raw clusters, which back
/// `clusters.json`.
pub fn assemble_report(input: &ReportInput, options: &ReportOptions) -> (Report, Vec<Cluster>) {
    let ids: Vec<&str> = input.items.iter().map(|item| item.id.as_str()).collect();
    let clustering = build_clusters(&ids, &input.pairs, &options.clustering);

    let items_by_id: HashMap<&str, &MediaItem> = input
        .items
        .iter()
        .map(|item| (item.id.as_str(), item))
        .collect();

    let clusters: Vec<ClusterReport> = clustering
        .clusters
        .iter()
        .map(|cluster| cluster_report(cluster, &items_by_id))
        .collect();

    let counters = ReportCounters {
        items: items_by_id.len(),
        pairs: input.pairs.len(),
        clusters: clusters.len(),
        clustered_items: clusters.iter().map(|c| c.size).sum(),
        excluded_singles: clustering.counters.singles_excluded,
        unknown_item_references: clustering.counters.pairs_unknown,
        pairs_merged: clustering.counters.pairs_merged,
        pairs_forced: clustering.counters.pairs_forced,
        failures: input.failures.len(),
    };

    let report = Report {
        run_id: input.run_id.clone(),
        parameters: ReportParameters {
            threshold: options.clustering.threshold,
            top_pairs: options.clustering.top_pairs,
            include_singles: options.clustering.include_singles,
            hash_bits: options.hash_bits,
        },
        counters,
        clusters,
        top_pairs: clustering
            .ranked
            .iter()
            .take(options.clustering.top_pairs)
            .cloned()
            .collect(),
        failures: input.failures.clone(),
        timing_ms: input.timings,
    };

    (report, clustering.clusters)
}

/// Input files and parameters of a report run
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub items_path: PathBuf,
    pub similarity_path: PathBuf,
    pub run_path: PathBuf,
    pub out_dir: PathBuf,
    /// Overrides the run id found in the descriptor
    pub run_id: Option<String>,
    pub clustering: ClusterOptions,
}

impl ReportInput {
    /// Read the items, similarity rows and run descriptor of a request
    pub fn load(request: &ReportRequest) -> Result<(Self, RunDescriptor)> {
        let descriptor = RunDescriptor::load(&request.run_path)?;
        let run_id = infer_run_id(&request.run_path, &descriptor, request.run_id.as_deref());
        let items = read_items(&request.items_path)?;
        let pairs = read_similarity(&request.similarity_path, descriptor.hash_bits())?;

        tracing::info!(
            run_id = %run_id,
            items = items.len(),
            pairs = pairs.len(),
            "report inputs loaded"
        );

        let input = ReportInput {
            run_id,
            items,
            pairs,
            failures: descriptor.failures(),
            timings: descriptor.timings(),
        };
        Ok((input, descriptor))
    }
}

/// Load, cluster and write a full report
pub fn generate_report(request: &ReportRequest) -> Result<(Report, ReportPaths)> {
    let (input, descriptor) = ReportInput::load(request)?;
    let options = ReportOptions::new(request.clustering)
        .hash_bits(descriptor.hash_bits().unwrap_or(HASH_BITS));

    let (report, clusters) = assemble_report(&input, &options);
    let paths = write_report(&request.out_dir, &report, &clusters)?;
    Ok((report, paths))
}

fn cluster_report(cluster: &Cluster, items_by_id: &HashMap<&str, &MediaItem>) -> ClusterReport {
    let members = cluster
        .members
        .iter()
        .zip(&cluster.scores)
        .map(|(id, &score)| {
            let item = items_by_id.get(id.as_str());
            MemberReport {
                id: id.clone(),
                filename: item.and_then(|i| i.filename.clone()),
                content_url: item.and_then(|i| i.content_url.clone()),
                mime_type: item.and_then(|i| i.mime_type.clone()),
                dimensions: item.and_then(|i| i.dimensions_label()),
                create_time: item.and_then(|i| i.create_time),
                score,
                is_representative: *id == cluster.representative_id,
            }
        })
        .collect();

    ClusterReport {
        cluster_id: cluster.cluster_id.clone(),
        representative_id: cluster.representative_id.clone(),
        size: cluster.size(),
        similarity: cluster.similarity,
        members,
    }
}
