//! Difference Hash (dHash) implementation.
//!
//! dHash works by:
//! 1. Sampling the image onto a 9x8 luma grid (nearest source pixel)
//! 2. Comparing each cell to the one on its right
//! 3. Setting the bit if the left cell is brighter
//!
//! Bits are packed most-significant first in row-major order. Hashes from
//! independent runs are compared bitwise, so the grid size, luma weights
//! and comparison direction are fixed.

use super::decode::Raster;
use serde::{Deserialize, Serialize};

/// Grid width (one more column than bits per row)
pub const GRID_WIDTH: u32 = 9;
/// Grid height
pub const GRID_HEIGHT: u32 = 8;
/// Number of bits in a fingerprint
pub const HASH_BITS: u32 = 64;

/// A 64-bit dHash computed for one item.
///
/// `hash` is not serialized; reading a fingerprint back parses it from
/// `hash_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FingerprintRecord")]
pub struct Fingerprint {
    #[serde(rename = "id")]
    pub item_id: String,
    #[serde(skip)]
    pub hash: u64,
    pub hash_hex: String,
    #[serde(rename = "hash_bits")]
    pub bit_width: u32,
    #[serde(rename = "width")]
    pub grid_width: u32,
    #[serde(rename = "height")]
    pub grid_height: u32,
}

/// Serialized form of a [`Fingerprint`]
#[derive(Deserialize)]
pub struct FingerprintRecord {
    id: String,
    hash_hex: String,
    #[serde(default = "default_bits")]
    hash_bits: u32,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}

fn default_bits() -> u32 {
    HASH_BITS
}

fn default_width() -> u32 {
    GRID_WIDTH
}

fn default_height() -> u32 {
    GRID_HEIGHT
}

impl TryFrom<FingerprintRecord> for Fingerprint {
    type Error = String;

    fn try_from(record: FingerprintRecord) -> Result<Self, Self::Error> {
        let hash = u64::from_str_radix(&record.hash_hex, 16)
            .map_err(|e| format!("invalid hash_hex {:?}: {}", record.hash_hex, e))?;
        Ok(Self {
            item_id: record.id,
            hash,
            hash_hex: to_hex(hash),
            bit_width: record.hash_bits,
            grid_width: record.width,
            grid_height: record.height,
        })
    }
}

impl Fingerprint {
    pub fn new(item_id: impl Into<String>, hash: u64) -> Self {
        Self {
            item_id: item_id.into(),
            hash,
            hash_hex: to_hex(hash),
            bit_width: HASH_BITS,
            grid_width: GRID_WIDTH,
            grid_height: GRID_HEIGHT,
        }
    }

    /// Number of differing bits
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.hash ^ other.hash).count_ones()
    }
}

/// Zero-padded lowercase hex form of a hash
pub fn to_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}

/// ITU-R 601 luma, rounded to the nearest integer
pub fn luma([r, g, b]: [u8; 3]) -> u8 {
    (r as f64 * 0.299 + g as f64 * 0.587 + b as f64 * 0.114).round() as u8
}

/// Sample the raster onto a `target_width x target_height` luma grid.
///
/// Source coordinates are `floor(x * W / target_width)`, clamped to the
/// last row/column.
pub fn sample_luma_grid(raster: &Raster, target_width: u32, target_height: u32) -> Vec<u8> {
    let (width, height) = (raster.width() as u64, raster.height() as u64);
    let mut grid = Vec::with_capacity((target_width * target_height) as usize);

    for y in 0..target_height as u64 {
        let src_y = ((y * height) / target_height as u64).min(height - 1) as u32;
        for x in 0..target_width as u64 {
            let src_x = ((x * width) / target_width as u64).min(width - 1) as u32;
            grid.push(luma(raster.rgb(src_x, src_y)));
        }
    }

    grid
}

/// Compute the 64-bit difference hash of a raster
pub fn dhash(raster: &Raster) -> u64 {
    let grid = sample_luma_grid(raster, GRID_WIDTH, GRID_HEIGHT);
    hash_grid(&grid)
}

/// Pack the left-vs-right comparisons of a 9x8 luma grid
pub fn hash_grid(grid: &[u8]) -> u64 {
    let row = GRID_WIDTH as usize;
    let mut hash: u64 = 0;

    for y in 0..GRID_HEIGHT as usize {
        for x in 0..row - 1 {
            let left = grid[y * row + x];
            let right = grid[y * row + x + 1];
            hash = (hash << 1) | u64::from(left > right);
        }
    }

    hash
}

/// Fingerprint a decoded raster for an item
pub fn fingerprint(item_id: &str, raster: &Raster) -> Fingerprint {
    Fingerprint::new(item_id, dhash(raster))
}
