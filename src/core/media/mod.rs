//! # Media Module
//!
//! The items a run operates on, normalized from picker records.
//!
//! Records arrive either flat (`{id, baseUrl, filename, ...}`) or with the
//! media fields nested under `mediaFile`, and dimensions under
//! `mediaFile.mediaFileMetadata`. Numeric fields may be JSON numbers or
//! numeric strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Image encodings the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Resolve a declared mime type.
    ///
    /// Returns `None` for anything that is not `image/*`. PNG is picked out
    /// by name; every other image type is handed to the JPEG decoder.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        if !mime_type.starts_with("image/") {
            return None;
        }
        if mime_type.contains("png") {
            Some(ImageKind::Png)
        } else {
            Some(ImageKind::Jpeg)
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageKind::Jpeg => write!(f, "JPEG"),
            ImageKind::Png => write!(f, "PNG"),
        }
    }
}

/// A media item supplied by the picker. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    /// Base URL of the item content (without size suffix)
    pub content_url: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub dimensions: Option<(u32, u32)>,
    /// Decoder selection, resolved once from `mime_type`
    pub kind: Option<ImageKind>,
}

impl MediaItem {
    /// Create an item with only an id and mime type
    pub fn new(id: impl Into<String>, mime_type: Option<&str>) -> Self {
        let mime_type = mime_type.map(str::to_string);
        let kind = mime_type.as_deref().and_then(ImageKind::from_mime);
        Self {
            id: id.into(),
            content_url: None,
            mime_type,
            filename: None,
            create_time: None,
            dimensions: None,
            kind,
        }
    }

    pub fn with_content_url(mut self, url: impl Into<String>) -> Self {
        self.content_url = Some(url.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    pub fn with_create_time(mut self, time: DateTime<Utc>) -> Self {
        self.create_time = Some(time);
        self
    }

    /// Normalize a raw NDJSON record.
    ///
    /// Returns `None` when the record carries no id at all.
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = first_string(record, &[&["id"], &["mediaFile", "id"]])?;
        let mime_type = first_string(record, &[&["mimeType"], &["mediaFile", "mimeType"]]);

        let mut item = MediaItem::new(id, mime_type.as_deref());
        item.content_url = first_string(record, &[&["mediaFile", "baseUrl"], &["baseUrl"]]);
        item.filename = first_string(record, &[&["mediaFile", "filename"], &["filename"]]);
        item.create_time = first_string(
            record,
            &[
                &["createTime"],
                &["mediaFile", "createTime"],
                &["mediaFile", "mediaFileMetadata", "creationTime"],
            ],
        )
        .and_then(|raw| parse_timestamp(&raw));

        let width = first_u32(
            record,
            &[&["mediaFile", "mediaFileMetadata", "width"], &["width"]],
        );
        let height = first_u32(
            record,
            &[&["mediaFile", "mediaFileMetadata", "height"], &["height"]],
        );
        item.dimensions = match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        };

        Some(item)
    }

    /// Dimensions formatted as `WxH`
    pub fn dimensions_label(&self) -> Option<String> {
        self.dimensions.map(|(w, h)| format!("{}x{}", w, h))
    }
}

fn lookup<'a>(record: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(record, |value, key| value.get(key))
        .filter(|value| !value.is_null())
}

fn first_string(record: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(record, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_u32(record: &Value, paths: &[&[&str]]) -> Option<u32> {
    paths.iter().find_map(|path| match lookup(record, path)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => Some(time.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(value = raw, error = %e, "ignoring unparseable createTime");
            None
        }
    }
}
