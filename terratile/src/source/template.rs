//! Plain network layer addressed by a URL template.
//!
//! Covers XYZ-style tile servers whose URLs carry grid coordinates rather
//! than extents, e.g. `https://tiles.example.com/{level}/{row}/{col}.png`.

use super::{decode_with_image_crate, RasterSource, SourceError};
use crate::key::{LayerKey, TileKey};
use image::DynamicImage;

/// URL-template raster source.
///
/// The template must contain `{level}`, `{row}` and `{col}` placeholders.
pub struct TemplateSource {
    template: String,
    extension: String,
}

impl TemplateSource {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            extension: "png".to_string(),
        }
    }

    /// Sets the cache file extension (default `png`).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Derives the cache identity for this template.
    pub fn layer_key(&self) -> LayerKey {
        LayerKey::new(&self.template, &[("extension", self.extension.as_str())])
    }
}

impl RasterSource for TemplateSource {
    fn build_request_url(&self, tile: &TileKey) -> String {
        self.template
            .replace("{level}", &tile.level().to_string())
            .replace("{row}", &tile.row().to_string())
            .replace("{col}", &tile.col().to_string())
    }

    fn decode_image(&self, bytes: &[u8]) -> Result<DynamicImage, SourceError> {
        decode_with_image_crate(bytes)
    }

    fn file_extension(&self) -> &str {
        &self.extension
    }
}
