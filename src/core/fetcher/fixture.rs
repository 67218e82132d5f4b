//! Serves item bytes from a local fixture directory.
//!
//! Files are looked up as `<dir>/<id>.jpg`, `<id>.jpeg`, then `<id>.png`.
//! Items without a fixture go to the fallback fetcher unless the
//! fetcher is strict.

use super::ContentFetcher;
use crate::core::media::MediaItem;
use crate::error::FetchError;
use std::fs;
use std::path::PathBuf;

const FIXTURE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Reads fixture bytes by item id
pub struct FixtureFetcher {
    dir: PathBuf,
    strict: bool,
    fallback: Option<Box<dyn ContentFetcher>>,
}

impl FixtureFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            strict: false,
            fallback: None,
        }
    }

    /// Fail items that have no fixture instead of using the fallback
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Fetcher used for items without a fixture
    pub fn fallback(mut self, fetcher: Box<dyn ContentFetcher>) -> Self {
        self.fallback = Some(fetcher);
        self
    }

    fn locate(&self, id: &str) -> Option<PathBuf> {
        FIXTURE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", id, ext)))
            .find(|candidate| candidate.is_file())
    }
}

fn is_path_like(id: &str) -> bool {
    id.is_empty() || id.contains('/') || id.contains('\\') || id == "." || id == ".."
}

impl ContentFetcher for FixtureFetcher {
    fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>, FetchError> {
        if is_path_like(&item.id) {
            return Err(FetchError::PathLikeId {
                id: item.id.clone(),
            });
        }

        if let Some(path) = self.locate(&item.id) {
            tracing::trace!(id = %item.id, path = %path.display(), "serving fixture bytes");
            return fs::read(&path).map_err(|source| FetchError::FixtureRead { path, source });
        }

        match &self.fallback {
            Some(fallback) if !self.strict => fallback.fetch(item),
            _ => Err(FetchError::FixtureMissing {
                id: item.id.clone(),
                expected: FIXTURE_EXTENSIONS
                    .iter()
                    .map(|ext| format!("{}.{}", item.id, ext))
                    .collect::<Vec<_>>()
                    .join("/"),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
