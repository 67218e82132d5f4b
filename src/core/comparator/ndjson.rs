//! Buffered NDJSON output for similarity pairs.

use super::SimilarityPair;
use std::io::{self, BufWriter, Write};

/// Writes one JSON object per line; call [`PairWriter::finish`] to flush
pub struct PairWriter<W: Write> {
    inner: BufWriter<W>,
    written: usize,
}

impl<W: Write> PairWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn write_pair(&mut self, pair: &SimilarityPair) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, pair)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Write pairs in the order given
    pub fn write_pairs<'a>(&mut self, pairs: impl IntoIterator<Item = &'a SimilarityPair>) -> io::Result<()> {
        pairs.into_iter().try_for_each(|pair| self.write_pair(pair))
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered lines and hand back the underlying writer
    pub fn finish(self) -> io::Result<W> {
        self.inner.into_inner().map_err(|e| e.into_error())
    }
}
