//! # Pipeline Module
//!
//! Orchestrates a similarity probe over a batch of media items.
//!
//! ## Pipeline Stages
//! 1. **Fingerprint** - Fetch, decode and dHash every item on a worker pool
//! 2. **Compare** - Score every unordered pair of fingerprints
//! 3. **Write** - Similarity NDJSON plus a run descriptor for reporting
//!
//! ## Parallelism
//! Uses a dedicated rayon pool for the per-item stage. Results come back
//! in input order, so comparison output does not depend on scheduling.

mod executor;

pub use executor::{Pipeline, PipelineBuilder, PipelineConfig, ProbeArtifacts, ProbeOutcome};

use crate::core::comparator::SimilarityPair;
use crate::error::ProcessingFailure;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Label recorded for the hashing algorithm
pub const ALGORITHM: &str = "dhash";

/// How content is rendered and reduced before hashing
pub const IMAGE_RESIZE: &str = "w512-h512->9x8";

/// Pairs kept in the probe summary
pub const SUMMARY_TOP_PAIRS: usize = 10;

/// Per-phase time spent, summed over items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTimings {
    #[serde(rename = "download", default)]
    pub download_ms: u64,
    #[serde(rename = "hashing", default)]
    pub hashing_ms: u64,
    #[serde(rename = "comparison", default)]
    pub comparison_ms: u64,
}

impl ProbeTimings {
    /// Add two sets of counters
    #[must_use]
    pub fn merge(self, other: ProbeTimings) -> ProbeTimings {
        ProbeTimings {
            download_ms: self.download_ms + other.download_ms,
            hashing_ms: self.hashing_ms + other.hashing_ms,
            comparison_ms: self.comparison_ms + other.comparison_ms,
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Summary stored under `similarity_probe` in the run descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub algorithm: String,
    pub hash_bits: u32,
    pub image_resize: String,
    pub near_match_threshold: u8,
    pub items_total: usize,
    pub items_hashed: usize,
    pub pairs_evaluated: usize,
    pub top_pairs: Vec<SimilarityPair>,
    pub failures: Vec<ProcessingFailure>,
    pub timing_ms: ProbeTimings,
}

/// Run descriptor written next to the similarity NDJSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub run_id: String,
    pub similarity_probe: ProbeSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timings_merge_field_by_field() {
        let a = ProbeTimings {
            download_ms: 5,
            hashing_ms: 2,
            comparison_ms: 0,
        };
        let b = ProbeTimings {
            download_ms: 7,
            hashing_ms: 1,
            comparison_ms: 3,
        };
        let merged = a.merge(b);
        assert_eq!(merged.download_ms, 12);
        assert_eq!(merged.hashing_ms, 3);
        assert_eq!(merged.comparison_ms, 3);
    }

    #[test]
    fn timings_serialize_with_short_names() {
        let json = serde_json::to_value(ProbeTimings {
            download_ms: 1,
            hashing_ms: 2,
            comparison_ms: 3,
        })
        .unwrap();
        assert_eq!(json["download"], 1);
        assert_eq!(json["hashing"], 2);
        assert_eq!(json["comparison"], 3);
    }
}
