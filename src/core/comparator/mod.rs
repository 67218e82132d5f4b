//! # Comparator Module
//!
//! Compares every pair of fingerprints.
//!
//! ## How It Works
//! 1. Hamming distance = popcount(a XOR b)
//! 2. Similarity = round(100 * (1 - distance / 64))
//! 3. Pairs are stored under their canonical key (`id_a < id_b`)
//!
//! ## Scaling
//! Comparison is O(n²) in the number of fingerprints. Runs are bounded by
//! the upstream selection-size cap; large selections need a different
//! candidate strategy rather than a change to this all-pairs pass.
//!
//! ## Similarity Bands
//! | Similarity | Distance | Reading          |
//! |------------|----------|------------------|
//! | 100        | 0        | Same content     |
//! | 94-98      | 1-4      | Near-exact       |
//! | 84-92      | 5-10     | Likely duplicate |
//! | < 84       | 11+      | Possibly related |

mod ndjson;

pub use ndjson::PairWriter;

use crate::core::hasher::{Fingerprint, HASH_BITS};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Canonical key of an unordered pair: `lesser < greater`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub lesser: String,
    pub greater: String,
}

/// Build the canonical key for two ids, in either order
pub fn pair_key(a: &str, b: &str) -> PairKey {
    let (lesser, greater) = if a <= b { (a, b) } else { (b, a) };
    PairKey {
        lesser: lesser.to_string(),
        greater: greater.to_string(),
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.lesser, self.greater)
    }
}

/// Number of differing bits between two hashes
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Similarity percentage for a distance over `bits` bits
pub fn similarity_percent(distance: u32, bits: u32) -> u8 {
    if bits == 0 {
        return 100;
    }
    let distance = distance.min(bits);
    (100.0 * (1.0 - distance as f64 / bits as f64)).round() as u8
}

/// Similarity between two items, keyed canonically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub id_a: String,
    pub id_b: String,
    pub hamming_distance: u32,
    pub similarity_percent: u8,
    pub hash_bits: u32,
}

impl SimilarityPair {
    /// Create a pair; the ids are reordered into canonical form
    pub fn new(
        a: impl Into<String>,
        b: impl Into<String>,
        hamming_distance: u32,
        similarity_percent: u8,
        hash_bits: u32,
    ) -> Self {
        let (a, b) = (a.into(), b.into());
        let (id_a, id_b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            id_a,
            id_b,
            hamming_distance,
            similarity_percent: similarity_percent.min(100),
            hash_bits,
        }
    }

    /// Compare two fingerprints
    pub fn between(a: &Fingerprint, b: &Fingerprint) -> Self {
        let distance = hamming_distance(a.hash, b.hash);
        Self::new(
            a.item_id.clone(),
            b.item_id.clone(),
            distance,
            similarity_percent(distance, HASH_BITS),
            HASH_BITS,
        )
    }

    pub fn key(&self) -> PairKey {
        pair_key(&self.id_a, &self.id_b)
    }
}

/// Ranking order: similarity descending, then canonical key ascending
pub fn rank_order(a: &SimilarityPair, b: &SimilarityPair) -> Ordering {
    b.similarity_percent
        .cmp(&a.similarity_percent)
        .then_with(|| (&a.id_a, &a.id_b).cmp(&(&b.id_a, &b.id_b)))
}

/// Stable sort of pairs into ranking order
pub fn rank_pairs(pairs: &mut [SimilarityPair]) {
    pairs.sort_by(rank_order);
}

/// The `n` most similar pairs, in ranking order
pub fn top_pairs(pairs: &[SimilarityPair], n: usize) -> Vec<SimilarityPair> {
    let mut ranked = pairs.to_vec();
    rank_pairs(&mut ranked);
    ranked.truncate(n);
    ranked
}

/// Compare every unordered pair of fingerprints
///
/// Self-comparisons are skipped; output is in canonical ranking order.
pub fn compare_all(fingerprints: &[Fingerprint]) -> Vec<SimilarityPair> {
    let n = fingerprints.len();
    let mut pairs = Vec::with_capacity(n.saturating_sub(1) * n / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            if fingerprints[i].item_id == fingerprints[j].item_id {
                continue;
            }
            pairs.push(SimilarityPair::between(&fingerprints[i], &fingerprints[j]));
        }
    }

    rank_pairs(&mut pairs);
    pairs
}
