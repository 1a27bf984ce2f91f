//! Cache-slot identity types.
//!
//! A cache slot is identified by a [`LayerKey`] (which data source, with
//! which options) and a [`TileKey`] (which geographic extent, at which zoom
//! level and pixel size). Both are immutable value types; the disk cache
//! derives its on-disk layout from them deterministically.
//!
//! # Example
//!
//! ```ignore
//! use terratile::key::{LayerKey, TileKey, BoundingBox};
//!
//! let layer = LayerKey::new(
//!     "https://wms.example.com/service",
//!     &[("layers", "imagery"), ("format", "image/png")],
//! );
//! let tile = TileKey::new(
//!     BoundingBox::new(-10.0, -10.0, 10.0, 10.0)?,
//!     3, 7, 16, 256, 256,
//! );
//! ```

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Deepest supported tile level. The grid arithmetic shifts `1u64` by
/// `level + 1`, so levels beyond this are rejected at construction.
pub const MAX_LEVEL: u32 = 62;

/// Errors produced while constructing key types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    /// Extents do not satisfy `min < max` on both axes.
    #[error("invalid extents: ({min_lon}, {min_lat}) .. ({max_lon}, {max_lat})")]
    InvalidExtents {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },

    /// Extents contain an infinite or NaN coordinate.
    #[error("non-finite extents: ({min_lon}, {min_lat}) .. ({max_lon}, {max_lat})")]
    NonFiniteExtents {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },

    /// Tile level beyond what the grid supports.
    #[error("level {level} exceeds the supported maximum {}", MAX_LEVEL)]
    LevelTooDeep { level: u32 },
}

// =============================================================================
// LayerKey
// =============================================================================

/// Stable identity of a raster data source.
///
/// The `name` is a filesystem-safe mangling of the layer's identifying URL
/// or table name. The `id` is a hash over all layer options (format, style,
/// query parameters) so that two differently-configured layers sharing a URL
/// never share a cache subtree.
///
/// The hash is computed with SHA-256 rather than the std hasher so the value
/// is stable across processes; the on-disk cache layout must survive
/// restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerKey {
    name: String,
    id: u64,
}

impl LayerKey {
    /// Creates a layer key from an identifying name and its option set.
    ///
    /// Options are sorted before hashing so that the id does not depend on
    /// the order the caller assembled them in.
    pub fn new(identifier: &str, options: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(&str, &str)> = options.to_vec();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        for (key, value) in &sorted {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let id = u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"));

        Self {
            name: sanitize_name(identifier),
            id,
        }
    }

    /// Creates a layer key from already-resolved parts.
    ///
    /// The name is sanitized; the id is taken as-is. Used by callers that
    /// manage their own option hashing, and by tests pinning the on-disk
    /// layout.
    pub fn from_parts(name: &str, id: u64) -> Self {
        Self {
            name: sanitize_name(name),
            id,
        }
    }

    /// The filesystem-safe layer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The options hash.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:x}", self.name, self.id)
    }
}

/// Mangles an identifier into a filesystem-safe directory name.
///
/// Every character outside `[A-Za-z0-9_.-]` becomes `_`. The mapping is
/// lossy; the options hash in [`LayerKey::id`] disambiguates collisions.
fn sanitize_name(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// =============================================================================
// BoundingBox
// =============================================================================

/// Geographic extents in degrees: `min_lon, min_lat, max_lon, max_lat`.
///
/// Invariant: every coordinate is finite, `min_lon < max_lon` and
/// `min_lat < max_lat`, enforced at construction. The cache path encoder
/// relies on finiteness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    /// Creates a bounding box, validating that every coordinate is finite
    /// and the extent ordering holds.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, KeyError> {
        if ![min_lon, min_lat, max_lon, max_lat]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(KeyError::NonFiniteExtents {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        if !(min_lon < max_lon && min_lat < max_lat) {
            return Err(KeyError::InvalidExtents {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }
}

// =============================================================================
// TileKey
// =============================================================================

/// Identity of one rendering tile within a layer.
///
/// Extents are authoritative for cache-path derivation; `row` and `col` are
/// carried for convenience (they are derivable from extents and level in the
/// fixed tiling scheme, see [`TileKey::from_grid`]).
#[derive(Debug, Clone, PartialEq)]
pub struct TileKey {
    extents: BoundingBox,
    level: u32,
    row: u32,
    col: u32,
    width: u32,
    height: u32,
}

impl TileKey {
    /// Creates a tile key from explicit extents.
    pub fn new(extents: BoundingBox, level: u32, row: u32, col: u32, width: u32, height: u32) -> Self {
        Self {
            extents,
            level,
            row,
            col,
            width,
            height,
        }
    }

    /// Creates a tile key from grid coordinates in the global geodetic
    /// tiling scheme.
    ///
    /// Level 0 covers the world with a 2x1 grid of 180-degree tiles; each
    /// level doubles both axes. At level `L` there are `2^(L+1)` columns and
    /// `2^L` rows, each tile spanning `180 / 2^L` degrees. Row 0 is the
    /// southernmost row, column 0 the westernmost column. Levels above
    /// [`MAX_LEVEL`] are rejected.
    pub fn from_grid(level: u32, row: u32, col: u32, width: u32, height: u32) -> Result<Self, KeyError> {
        if level > MAX_LEVEL {
            return Err(KeyError::LevelTooDeep { level });
        }
        let span = 180.0 / (1u64 << level) as f64;
        let min_lon = -180.0 + col as f64 * span;
        let min_lat = -90.0 + row as f64 * span;
        let extents = BoundingBox::new(min_lon, min_lat, min_lon + span, min_lat + span)?;
        Ok(Self::new(extents, level, row, col, width, height))
    }

    pub fn extents(&self) -> &BoundingBox {
        &self.extents
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "L{:03} ({}, {})..({}, {}) {}x{}",
            self.level,
            self.extents.min_lon,
            self.extents.min_lat,
            self.extents.max_lon,
            self.extents.max_lat,
            self.width,
            self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_key_sanitizes_name() {
        let key = LayerKey::new("https://wms.example.com/service?x=1", &[]);
        assert_eq!(key.name(), "https___wms.example.com_service_x_1");
    }

    #[test]
    fn test_layer_key_id_stable_across_option_order() {
        let a = LayerKey::new("layer", &[("format", "image/png"), ("styles", "default")]);
        let b = LayerKey::new("layer", &[("styles", "default"), ("format", "image/png")]);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_layer_key_id_differs_for_different_options() {
        let a = LayerKey::new("layer", &[("format", "image/png")]);
        let b = LayerKey::new("layer", &[("format", "image/jpeg")]);
        assert_eq!(a.name(), b.name());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_layer_key_option_values_not_confusable() {
        // ("ab", "c") must not hash like ("a", "bc").
        let a = LayerKey::new("layer", &[("ab", "c")]);
        let b = LayerKey::new("layer", &[("a", "bc")]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_layer_key_from_parts() {
        let key = LayerKey::from_parts("wms1", 42);
        assert_eq!(key.name(), "wms1");
        assert_eq!(key.id(), 42);
        assert_eq!(format!("{}", key), "wms1/2a");
    }

    #[test]
    fn test_bounding_box_rejects_inverted_extents() {
        assert!(BoundingBox::new(10.0, -10.0, -10.0, 10.0).is_err());
        assert!(BoundingBox::new(-10.0, 10.0, 10.0, -10.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_bounding_box_rejects_non_finite_extents() {
        // An infinite coordinate would otherwise reach the cache path
        // encoder, where "{:.15}" formats it without a decimal point.
        assert!(matches!(
            BoundingBox::new(f64::NEG_INFINITY, -10.0, 10.0, 10.0),
            Err(KeyError::NonFiniteExtents { .. })
        ));
        assert!(BoundingBox::new(-10.0, -10.0, f64::INFINITY, 10.0).is_err());
        assert!(BoundingBox::new(-10.0, f64::NAN, 10.0, 10.0).is_err());
    }

    #[test]
    fn test_bounding_box_accepts_valid_extents() {
        let bbox = BoundingBox::new(-10.0, -10.0, 10.0, 10.0).unwrap();
        assert_eq!(bbox.min_lon(), -10.0);
        assert_eq!(bbox.max_lat(), 10.0);
    }

    #[test]
    fn test_tile_from_grid_level_zero() {
        let west = TileKey::from_grid(0, 0, 0, 256, 256).unwrap();
        assert_eq!(west.extents().min_lon(), -180.0);
        assert_eq!(west.extents().min_lat(), -90.0);
        assert_eq!(west.extents().max_lon(), 0.0);
        assert_eq!(west.extents().max_lat(), 90.0);

        let east = TileKey::from_grid(0, 0, 1, 256, 256).unwrap();
        assert_eq!(east.extents().min_lon(), 0.0);
        assert_eq!(east.extents().max_lon(), 180.0);
    }

    #[test]
    fn test_tile_from_grid_rejects_levels_beyond_maximum() {
        // 1u64 << 63 is the last representable shift; from_grid must
        // error, not overflow, past the supported depth.
        assert!(matches!(
            TileKey::from_grid(MAX_LEVEL + 1, 0, 0, 256, 256),
            Err(KeyError::LevelTooDeep { level }) if level == MAX_LEVEL + 1
        ));
        assert!(TileKey::from_grid(64, 0, 0, 256, 256).is_err());
    }

    #[test]
    fn test_tile_from_grid_deeper_level() {
        // Level 3: 22.5-degree tiles, 16 columns x 8 rows.
        let tile = TileKey::from_grid(3, 2, 4, 256, 256).unwrap();
        assert_eq!(tile.extents().min_lon(), -180.0 + 4.0 * 22.5);
        assert_eq!(tile.extents().min_lat(), -90.0 + 2.0 * 22.5);
        assert_eq!(tile.extents().max_lon() - tile.extents().min_lon(), 22.5);
    }
}
