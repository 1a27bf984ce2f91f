//! OGC WMS raster source.
//!
//! Builds `GetMap` requests from tile extents. The cache core never sees
//! these parameter names; they live here and in the layer's option hash.
//!
//! # URL Pattern
//!
//! `{base}?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap&LAYERS={layers}`
//! `&STYLES={styles}&SRS=EPSG:4326&BBOX={minLon},{minLat},{maxLon},{maxLat}`
//! `&WIDTH={w}&HEIGHT={h}&FORMAT={format}&TRANSPARENT=TRUE`

use super::{decode_with_image_crate, RasterSource, SourceError};
use crate::key::{LayerKey, TileKey};
use image::DynamicImage;

/// WMS protocol version sent with every request.
const WMS_VERSION: &str = "1.1.1";

/// Spatial reference system for the bounding box.
const WMS_SRS: &str = "EPSG:4326";

/// WMS `GetMap` source.
///
/// # Example
///
/// ```ignore
/// use terratile::source::WmsSource;
///
/// let source = WmsSource::new("https://wms.example.com/service", "imagery")
///     .with_format("image/jpeg")
///     .with_styles("default");
/// let layer_key = source.layer_key();
/// ```
pub struct WmsSource {
    base_url: String,
    layers: String,
    styles: String,
    format: String,
}

impl WmsSource {
    /// Creates a WMS source for the given endpoint and layer list.
    pub fn new(base_url: impl Into<String>, layers: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            layers: layers.into(),
            styles: String::new(),
            format: "image/png".to_string(),
        }
    }

    /// Sets the requested image format (default `image/png`).
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Sets the requested style list (default empty, server default style).
    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = styles.into();
        self
    }

    /// Derives the cache identity for this source configuration.
    ///
    /// The name comes from the endpoint URL; the id hashes every option
    /// that changes the returned pixels, so reconfiguring the source moves
    /// it to a fresh cache subtree.
    pub fn layer_key(&self) -> LayerKey {
        LayerKey::new(
            &self.base_url,
            &[
                ("layers", self.layers.as_str()),
                ("styles", self.styles.as_str()),
                ("format", self.format.as_str()),
                ("srs", WMS_SRS),
                ("version", WMS_VERSION),
            ],
        )
    }
}

impl RasterSource for WmsSource {
    fn build_request_url(&self, tile: &TileKey) -> String {
        let e = tile.extents();
        format!(
            "{}?SERVICE=WMS&VERSION={}&REQUEST=GetMap&LAYERS={}&STYLES={}&SRS={}\
             &BBOX={},{},{},{}&WIDTH={}&HEIGHT={}&FORMAT={}&TRANSPARENT=TRUE",
            self.base_url,
            WMS_VERSION,
            self.layers,
            self.styles,
            WMS_SRS,
            e.min_lon(),
            e.min_lat(),
            e.max_lon(),
            e.max_lat(),
            tile.width(),
            tile.height(),
            self.format
        )
    }

    fn decode_image(&self, bytes: &[u8]) -> Result<DynamicImage, SourceError> {
        decode_with_image_crate(bytes)
    }

    fn file_extension(&self) -> &str {
        match self.format.as_str() {
            "image/jpeg" => "jpg",
            _ => "png",
        }
    }
}
