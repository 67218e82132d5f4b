//! # Hasher Module
//!
//! Turns fetched image bytes into a 64-bit difference hash.
//!
//! ## How It Works
//! 1. Decode JPEG/PNG bytes into an RGBA raster
//! 2. Sample a 9x8 luma grid (nearest source pixel)
//! 3. Compare each cell to its right neighbour
//! 4. Pack the 64 comparison bits into a `u64`
//!
//! ## Performance Optimizations
//! - Uses `zune-jpeg` for 1.5-2x faster JPEG decoding
//! - Only the 72 sampled pixels are converted to luma
//!
//! ## Example
//! ```rust,ignore
//! use photo_cluster::core::hasher::{decode, fingerprint};
//!
//! let raster = decode(&bytes, ImageKind::Jpeg)?;
//! let fp = fingerprint("item-1", &raster);
//! println!("{}", fp.hash_hex);
//! ```

mod decode;
mod difference;

pub use decode::{decode, Raster};
pub use difference::{
    dhash, fingerprint, hash_grid, luma, sample_luma_grid, to_hex, Fingerprint, GRID_HEIGHT,
    GRID_WIDTH, HASH_BITS,
};

use crate::core::fetcher::FetchedContent;
use crate::error::ProcessingFailure;

/// Decode fetched content and fingerprint it
pub fn fingerprint_content(item_id: &str, content: &FetchedContent) -> Result<Fingerprint, ProcessingFailure> {
    let raster = decode(&content.bytes, content.kind)
        .map_err(|e| ProcessingFailure::from_decode(item_id, &e))?;
    Ok(fingerprint(item_id, &raster))
}
