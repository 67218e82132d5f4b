//! # Ingest Module
//!
//! Reads the input artifacts of a run: item NDJSON, similarity NDJSON and
//! the run descriptor.
//!
//! Similarity rows come in two naming variants and both are accepted:
//! `{id_a, id_b, similarity_percent, hamming_distance, hash_bits}` and the
//! short `{a, b, similarity, distance}` form written by older probes.

mod failures;

pub use failures::parse_failure;

use crate::core::comparator::SimilarityPair;
use crate::core::hasher::HASH_BITS;
use crate::core::media::MediaItem;
use crate::core::pipeline::ProbeTimings;
use crate::error::{IngestError, ProcessingFailure};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

fn read_to_string(path: &Path) -> Result<String, IngestError> {
    fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every non-blank line of an NDJSON file
pub fn read_ndjson(path: &Path) -> Result<Vec<Value>, IngestError> {
    let content = read_to_string(path)?;
    parse_ndjson(&content).map_err(|(line, source)| IngestError::Json {
        path: path.to_path_buf(),
        line,
        source,
    })
}

fn parse_ndjson(content: &str) -> Result<Vec<Value>, (usize, serde_json::Error)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| serde_json::from_str(line.trim()).map_err(|e| (idx + 1, e)))
        .collect()
}

/// Read and normalize item records.
///
/// Records without an id are skipped; when an id repeats, the first record
/// wins.
pub fn read_items(path: &Path) -> Result<Vec<MediaItem>, IngestError> {
    let records = read_ndjson(path)?;
    Ok(items_from_records(&records))
}

pub fn items_from_records(records: &[Value]) -> Vec<MediaItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for record in records {
        match MediaItem::from_record(record) {
            Some(item) => {
                if seen.insert(item.id.clone()) {
                    items.push(item);
                } else {
                    tracing::debug!(id = %item.id, "duplicate item record ignored");
                }
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "item records without an id were skipped");
    }
    items
}

/// Read similarity rows into canonical pairs.
///
/// `fallback_bits` is used for rows without `hash_bits`; 64 if absent too.
pub fn read_similarity(path: &Path, fallback_bits: Option<u32>) -> Result<Vec<SimilarityPair>, IngestError> {
    let rows = read_ndjson(path)?;
    let mut skipped = 0usize;
    let pairs: Vec<_> = rows
        .iter()
        .filter_map(|row| {
            let pair = normalize_pair(row, fallback_bits);
            if pair.is_none() {
                skipped += 1;
            }
            pair
        })
        .collect();

    if skipped > 0 {
        tracing::warn!(skipped, path = %path.display(), "similarity rows without ids or similarity were skipped");
    }
    Ok(pairs)
}

fn field<'a>(row: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| row.get(name).filter(|v| !v.is_null()))
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Normalize one similarity row; `None` if ids or similarity are missing
pub fn normalize_pair(row: &Value, fallback_bits: Option<u32>) -> Option<SimilarityPair> {
    let id_a = field(row, &["id_a", "a"]).and_then(as_id)?;
    let id_b = field(row, &["id_b", "b"]).and_then(as_id)?;
    let similarity = field(row, &["similarity_percent", "similarity"]).and_then(as_number)?;

    let hash_bits = field(row, &["hash_bits"])
        .and_then(as_number)
        .map(|v| v as u32)
        .filter(|&v| v > 0)
        .or(fallback_bits)
        .unwrap_or(HASH_BITS);

    let similarity = similarity.round().clamp(0.0, 100.0) as u8;
    let distance = field(row, &["hamming_distance", "distance"])
        .and_then(as_number)
        .map(|v| v.round().max(0.0) as u32)
        .unwrap_or_else(|| distance_for(similarity, hash_bits));

    Some(SimilarityPair::new(id_a, id_b, distance, similarity, hash_bits))
}

/// Nearest distance consistent with a similarity percentage
fn distance_for(similarity: u8, hash_bits: u32) -> u32 {
    ((100 - u32::from(similarity.min(100))) as f64 * hash_bits as f64 / 100.0).round() as u32
}

/// The `similarity_probe` section of a run descriptor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeSection {
    #[serde(default, alias = "hashBits")]
    pub hash_bits: Option<u32>,
    #[serde(default)]
    pub failures: Vec<Value>,
    #[serde(default)]
    pub timing_ms: Option<ProbeTimings>,
}

/// Descriptor of a probe run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunDescriptor {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub similarity_probe: Option<ProbeSection>,
}

impl RunDescriptor {
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let content = read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| IngestError::Json {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })
    }

    pub fn hash_bits(&self) -> Option<u32> {
        self.similarity_probe.as_ref().and_then(|p| p.hash_bits)
    }

    /// Failures recorded by the probe, mapped onto reason codes
    pub fn failures(&self) -> Vec<ProcessingFailure> {
        self.similarity_probe
            .as_ref()
            .map(|p| p.failures.iter().filter_map(parse_failure).collect())
            .unwrap_or_default()
    }

    pub fn timings(&self) -> Option<ProbeTimings> {
        self.similarity_probe.as_ref().and_then(|p| p.timing_ms)
    }
}

/// Resolve the run id: explicit override, then descriptor, then file name
/// with `-run.json` / `.json` stripped
pub fn infer_run_id(run_path: &Path, descriptor: &RunDescriptor, explicit: Option<&str>) -> String {
    if let Some(id) = explicit.filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    if let Some(id) = descriptor.run_id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    let basename = run_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = basename.strip_suffix("-run.json").unwrap_or(&basename);
    stem.strip_suffix(".json").unwrap_or(stem).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn both_naming_variants_are_accepted() {
        let long = json!({"id_a": "b", "id_b": "a", "similarity_percent": 84, "hamming_distance": 10, "hash_bits": 64});
        let short = json!({"a": "b", "b": "a", "similarity": 84, "distance": 10});

        let long = normalize_pair(&long, None).unwrap();
        let short = normalize_pair(&short, None).unwrap();

        assert_eq!(long, short);
        assert_eq!(long.id_a, "a");
        assert_eq!(long.hamming_distance, 10);
    }

    #[test]
    fn rows_without_ids_or_similarity_are_rejected() {
        assert!(normalize_pair(&json!({"id_a": "a", "similarity": 90}), None).is_none());
        assert!(normalize_pair(&json!({"id_a": "a", "id_b": "b"}), None).is_none());
        assert!(normalize_pair(&json!({"id_a": "", "id_b": "b", "similarity": 1}), None).is_none());
    }

    #[test]
    fn hash_bits_fall_back_to_descriptor_then_64() {
        let row = json!({"a": "x", "b": "y", "similarity": 50});
        assert_eq!(normalize_pair(&row, Some(256)).unwrap().hash_bits, 256);
        assert_eq!(normalize_pair(&row, None).unwrap().hash_bits, 64);
    }

    #[test]
    fn missing_distance_is_derived() {
        let row = json!({"a": "x", "b": "y", "similarity": 50});
        assert_eq!(normalize_pair(&row, None).unwrap().hamming_distance, 32);
    }

    #[test]
    fn fractional_similarity_is_rounded() {
        let row = json!({"a": "x", "b": "y", "similarity": 84.375});
        assert_eq!(normalize_pair(&row, None).unwrap().similarity_percent, 84);
    }

    #[test]
    fn ndjson_skips_blank_lines_and_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.ndjson");

        fs::write(&path, "{\"id\":\"a\"}\n\n  \r\n{\"id\":\"b\"}\r\n").unwrap();
        assert_eq!(read_ndjson(&path).unwrap().len(), 2);

        fs::write(&path, "{\"id\":\"a\"}\n{oops\n").unwrap();
        match read_ndjson(&path) {
            Err(IngestError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected json error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = read_ndjson(Path::new("/definitely/not/here.ndjson"));
        assert!(matches!(result, Err(IngestError::Read { .. })));
    }

    #[test]
    fn items_are_deduplicated_by_id() {
        let records = vec![
            json!({"id": "a", "filename": "first.jpg"}),
            json!({"id": "a", "filename": "second.jpg"}),
            json!({"filename": "anonymous.jpg"}),
            json!({"id": "b"}),
        ];
        let items = items_from_records(&records);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].filename.as_deref(), Some("first.jpg"));
    }

    #[test]
    fn run_id_inference() {
        let empty = RunDescriptor::default();
        let named = RunDescriptor {
            run_id: Some("run-42".into()),
            similarity_probe: None,
        };
        let path = PathBuf::from("/tmp/2024-05-01-run.json");

        assert_eq!(infer_run_id(&path, &named, Some("override")), "override");
        assert_eq!(infer_run_id(&path, &named, None), "run-42");
        assert_eq!(infer_run_id(&path, &empty, None), "2024-05-01");
        assert_eq!(infer_run_id(Path::new("probe.json"), &empty, None), "probe");
        assert_eq!(infer_run_id(Path::new("notes.txt"), &empty, None), "notes.txt");
    }

    #[test]
    fn descriptor_exposes_probe_details() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{
                "run_id": "r1",
                "similarity_probe": {
                    "hashBits": 64,
                    "failures": [
                        {"id": "x", "error": "download_failed_404"},
                        {"id": "y", "reason": "TIMEOUT", "detail": "30s"}
                    ],
                    "timing_ms": {"download": 10, "hashing": 5, "comparison": 1}
                }
            }"#,
        )
        .unwrap();

        let descriptor = RunDescriptor::load(&path).unwrap();
        assert_eq!(descriptor.run_id.as_deref(), Some("r1"));
        assert_eq!(descriptor.hash_bits(), Some(64));

        let failures = descriptor.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].reason, FailureReason::DownloadFailed);
        assert_eq!(failures[0].detail, "404");
        assert_eq!(failures[1].reason, FailureReason::Timeout);

        let timings = descriptor.timings().unwrap();
        assert_eq!(timings.download_ms, 10);
    }
}
