//! Mapping of recorded probe failures onto reason codes.
//!
//! Current descriptors store `{id, reason, detail}`. Older probes wrote
//! `{id, error}` with codes such as `unsupported_mime_type`,
//! `missing_base_url`, `download_failed_404`, or a bare error message.

use crate::error::{FailureReason, ProcessingFailure};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn download_status() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^download_failed_(\d{3})$").expect("valid regex"))
}

/// Parse one failure entry; `None` if it has no item id
pub fn parse_failure(entry: &Value) -> Option<ProcessingFailure> {
    let id = entry
        .get("id")
        .or_else(|| entry.get("item_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;

    if let Some(reason) = entry
        .get("reason")
        .cloned()
        .and_then(|v| serde_json::from_value::<FailureReason>(v).ok())
    {
        let detail = entry
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Some(ProcessingFailure::new(id, reason, detail));
    }

    let error = entry
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (reason, detail) = classify_legacy(error);
    Some(ProcessingFailure::new(id, reason, detail))
}

fn classify_legacy(error: &str) -> (FailureReason, String) {
    if let Some(captures) = download_status().captures(error) {
        return (FailureReason::DownloadFailed, captures[1].to_string());
    }

    let lowered = error.to_ascii_lowercase();
    let reason = match lowered.as_str() {
        "unsupported_mime_type" => FailureReason::UnsupportedMimeType,
        "missing_base_url" | "missing_source_url" => FailureReason::MissingSourceUrl,
        _ if lowered.starts_with("download_failed") => FailureReason::DownloadFailed,
        _ if lowered.contains("timeout")
            || lowered.contains("timed out")
            || lowered.contains("aborted") =>
        {
            FailureReason::Timeout
        }
        _ => FailureReason::DecodeFailed,
    };
    (reason, error.to_string())
}
