//! # Fetcher Module
//!
//! Retrieves the image bytes for a media item.
//!
//! ## Gating
//! Items are checked before anything is fetched:
//! 1. mime type must be `image/*` (otherwise `UNSUPPORTED_MIME_TYPE`)
//! 2. the fetcher must be able to resolve a source (otherwise
//!    `MISSING_SOURCE_URL`)
//!
//! There are no retries here; callers that need resilience wrap the run.

mod fixture;
mod http;

pub use fixture::FixtureFetcher;
pub use http::HttpFetcher;

use crate::core::media::{ImageKind, MediaItem};
use crate::error::{FailureReason, FetchError, ProcessingFailure};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Size suffix appended to the base URL to request a bounded render
pub const DOWNLOAD_SIZE_SUFFIX: &str = "=w512-h512";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn googleusercontent_media_host() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^lh\d+\.googleusercontent\.com$").expect("valid regex")
    })
}

/// Source of image bytes for an item
pub trait ContentFetcher: Send + Sync {
    /// Fetch the full content of `item`
    fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>, FetchError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Raw bytes plus the decoder selected for them
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

/// Configuration for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bearer credential sent with every request
    pub access_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Suffix appended to the item base URL
    pub size_suffix: String,
    /// Hosts allowed as download targets. Empty means any host.
    /// Entries starting with `.` match any sub-domain.
    pub allowed_hosts: Vec<String>,
    /// Permit plain http and loopback/private targets (local test servers)
    pub allow_local_targets: bool,
}

impl FetchConfig {
    pub fn new() -> Self {
        Self {
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
            size_suffix: DOWNLOAD_SIZE_SUFFIX.to_string(),
            allowed_hosts: Vec::new(),
            allow_local_targets: false,
        }
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn size_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.size_suffix = suffix.into();
        self
    }

    pub fn allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts;
        self
    }

    pub fn allow_local_targets(mut self, allow: bool) -> Self {
        self.allow_local_targets = allow;
        self
    }

    /// The URL that will be requested for an item, if it has one
    pub fn content_url(&self, item: &MediaItem) -> Option<String> {
        item.content_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}{}", url, self.size_suffix))
    }

    pub(crate) fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| {
            let allowed = allowed.trim().to_ascii_lowercase();
            match allowed.strip_prefix('.') {
                Some(domain) => host == domain || host.ends_with(&format!(".{}", domain)),
                // A bare googleusercontent.com entry admits its lh<N> media hosts
                None if allowed == "googleusercontent.com" => {
                    host == allowed || googleusercontent_media_host().is_match(&host)
                }
                None => !allowed.is_empty() && host == allowed,
            }
        })
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Gate an item and fetch its content.
///
/// The mime type is checked before any fetch is attempted.
pub fn fetch_content(
    fetcher: &dyn ContentFetcher,
    item: &MediaItem,
) -> Result<FetchedContent, ProcessingFailure> {
    let kind = item.kind.ok_or_else(|| {
        ProcessingFailure::new(
            &item.id,
            FailureReason::UnsupportedMimeType,
            item.mime_type.clone().unwrap_or_else(|| "missing mime type".to_string()),
        )
    })?;

    let bytes = fetcher
        .fetch(item)
        .map_err(|e| ProcessingFailure::from_fetch(&item.id, &e))?;

    Ok(FetchedContent { bytes, kind })
}
