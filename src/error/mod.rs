//! # Error Module
//!
//! Error types for the clustering engine.
//!
//! ## Design Principles
//! - **Never abort a run for one item** - per-item problems become a
//!   [`ProcessingFailure`] and the item is left out of clustering
//! - **Include context** - paths, line numbers, item ids
//! - **Fatal only when the run cannot proceed** - bad arguments or input
//!   files that cannot be read at all

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum ClusterEngineError {
    #[error("Input error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Report generation error: {0}")]
    Report(#[from] ReportError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while reading the input artifacts of a run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path} at line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that occur while writing report artifacts
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that occur while fetching image content for one item
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Item has no source URL")]
    MissingSourceUrl,

    #[error("Download failed with HTTP status {status}")]
    Status { status: u16 },

    #[error("Download timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Download failed: {0}")]
    Transport(String),

    #[error("Download URL host '{host}' is not allowed")]
    HostNotAllowed { host: String },

    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Download URL must use https: {url}")]
    InsecureScheme { url: String },

    #[error("Download URL host '{host}' resolves to a non-global address")]
    NonGlobalAddress { host: String },

    #[error("Item id '{id}' looks like a path and cannot be used for fixture lookup")]
    PathLikeId { id: String },

    #[error("Fixture bytes missing for item '{id}'; expected {expected}")]
    FixtureMissing { id: String, expected: String },

    #[error("Failed to read fixture {path}: {source}")]
    FixtureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// The failure reason code recorded for this error
    pub fn reason(&self) -> FailureReason {
        match self {
            FetchError::MissingSourceUrl => FailureReason::MissingSourceUrl,
            FetchError::Timeout { .. } => FailureReason::Timeout,
            _ => FailureReason::DownloadFailed,
        }
    }
}

/// Errors that occur while decoding image bytes
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to decode {format} image: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Raster holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Why an item was left out of fingerprinting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    UnsupportedMimeType,
    MissingSourceUrl,
    DownloadFailed,
    DecodeFailed,
    Timeout,
}

impl FailureReason {
    /// The wire code, e.g. `DOWNLOAD_FAILED`
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::UnsupportedMimeType => "UNSUPPORTED_MIME_TYPE",
            FailureReason::MissingSourceUrl => "MISSING_SOURCE_URL",
            FailureReason::DownloadFailed => "DOWNLOAD_FAILED",
            FailureReason::DecodeFailed => "DECODE_FAILED",
            FailureReason::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A per-item failure, accumulated instead of aborting the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingFailure {
    #[serde(rename = "id")]
    pub item_id: String,
    pub reason: FailureReason,
    pub detail: String,
}

impl ProcessingFailure {
    pub fn new(item_id: impl Into<String>, reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            reason,
            detail: detail.into(),
        }
    }

    /// Record a fetch error for an item
    pub fn from_fetch(item_id: &str, error: &FetchError) -> Self {
        let detail = match error {
            FetchError::Status { status } => status.to_string(),
            other => other.to_string(),
        };
        Self::new(item_id, error.reason(), detail)
    }

    /// Record a decode error for an item
    pub fn from_decode(item_id: &str, error: &DecodeError) -> Self {
        Self::new(item_id, FailureReason::DecodeFailed, error.to_string())
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, ClusterEngineError>;
