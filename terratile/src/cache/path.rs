//! Deterministic cache-path derivation.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<layerName>/<layerIdHex>/W<width>_H<height>/L<level 3-digit>/
//!     <minLon>_<minLat>_<maxLon>_<maxLat>.<ext>
//! ```
//!
//! Coordinates are encoded fixed-width and sign-prefixed so that paths sort
//! and diff cleanly and never collide on floating-point formatting:
//! a sign letter (`P` for non-negative, `N` for negative), the integer part
//! zero-padded to 3 digits, an underscore, then 15 decimal digits with the
//! leading `0.` stripped. `-10.0` encodes as `N010_000000000000000`.

use crate::key::{LayerKey, TileKey};
use std::path::{Path, PathBuf};

/// Encodes one coordinate value for use in a cache file name.
pub fn encode_coord(value: f64) -> String {
    let sign = if value < 0.0 { 'N' } else { 'P' };
    // Formatting the absolute value with 15 decimals handles rounding carry
    // into the integer part (e.g. 9.9999999999999999 -> "10.000...").
    let formatted = format!("{:.15}", value.abs());
    let (int_part, frac_part) = formatted
        .split_once('.')
        .expect("{:.15} always produces a decimal point");
    format!("{}{:0>3}_{}", sign, int_part, frac_part)
}

/// The file stem identifying a tile within its level directory.
pub fn tile_stem(tile: &TileKey) -> String {
    let e = tile.extents();
    format!(
        "{}_{}_{}_{}",
        encode_coord(e.min_lon()),
        encode_coord(e.min_lat()),
        encode_coord(e.max_lon()),
        encode_coord(e.max_lat())
    )
}

/// The path for a cache entry relative to the cache root, without extension.
///
/// Also serves as the scheduler's coalescing key: two submissions map to the
/// same string exactly when they address the same cache slot.
pub fn relative_stem(layer: &LayerKey, tile: &TileKey) -> String {
    format!(
        "{}/{:x}/W{}_H{}/L{:03}/{}",
        layer.name(),
        layer.id(),
        tile.width(),
        tile.height(),
        tile.level(),
        tile_stem(tile)
    )
}

/// Composes the absolute path for a cache entry.
pub fn path_for(root: &Path, layer: &LayerKey, tile: &TileKey, extension: &str) -> PathBuf {
    root.join(layer.name())
        .join(format!("{:x}", layer.id()))
        .join(format!("W{}_H{}", tile.width(), tile.height()))
        .join(format!("L{:03}", tile.level()))
        .join(format!("{}.{}", tile_stem(tile), extension))
}
