//! Event type definitions for progress reporting.

use crate::error::ProcessingFailure;
use serde::{Deserialize, Serialize};

/// All events emitted while a run is in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Per-item fetch and fingerprint events
    Fingerprint(FingerprintEvent),
    /// Pairwise comparison events
    Compare(CompareEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Events during the fetch + decode + hash phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FingerprintEvent {
    /// Fingerprinting has started
    Started { total_items: usize },
    /// Progress update after each item
    Progress(FingerprintProgress),
    /// An item failed; the run continues without it
    Failed(ProcessingFailure),
    /// Fingerprinting completed
    Completed { hashed: usize, failed: usize },
}

/// Progress information during fingerprinting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintProgress {
    /// Items finished so far (hashed or failed)
    pub completed: usize,
    /// Total number of items
    pub total: usize,
    /// Item that just finished
    pub current_id: String,
}

/// Events during the comparison phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompareEvent {
    /// Comparison has started
    Started { total_fingerprints: usize },
    /// Comparison completed
    Completed { pairs_evaluated: usize },
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline completed successfully
    Completed { summary: PipelineSummary },
}

/// Phases of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Fingerprinting,
    Comparing,
    Writing,
}

/// Summary of pipeline results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Items in the input
    pub total_items: usize,
    /// Items that produced a fingerprint
    pub hashed_items: usize,
    /// Items that failed
    pub failed_items: usize,
    /// Pairs compared
    pub pairs_evaluated: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Fingerprinting => write!(f, "Fingerprinting"),
            PipelinePhase::Comparing => write!(f, "Comparing"),
            PipelinePhase::Writing => write!(f, "Writing"),
        }
    }
}
