//! Raster source abstraction.
//!
//! A [`RasterSource`] supplies the URL-building and image-decoding logic for
//! one server protocol. The fetch core is protocol-agnostic: it never knows
//! server-specific query-parameter names, only the trait surface here.
//!
//! Shipped adapters:
//!
//! - [`WmsSource`]: OGC WMS `GetMap` requests built from tile extents.
//! - [`TemplateSource`]: plain network layers addressed by a URL template
//!   with `{level}`/`{row}`/`{col}` placeholders.
//!
//! # Example
//!
//! ```ignore
//! use terratile::source::{RasterSource, WmsSource};
//!
//! let source = WmsSource::new("https://wms.example.com/service", "imagery");
//! let url = source.build_request_url(&tile);
//! let image = source.decode_image(&bytes)?;
//! ```

mod http;
mod template;
mod wms;

pub use http::{BoxFuture, HttpClient, ReqwestClient};

#[cfg(test)]
pub use http::tests::{MockHttpClient, MockResponse};
pub use template::TemplateSource;
pub use wms::WmsSource;

use crate::key::TileKey;
use image::DynamicImage;
use thiserror::Error;

/// Errors from raster source operations.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// HTTP transport or status error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response body is not a decodable image.
    #[error("failed to decode image: {0}")]
    Decode(String),
}

/// Protocol-specific logic for one raster server.
///
/// Implementations must be cheap to call: `build_request_url` runs on the
/// fetch path for every tile, and `decode_image` runs on every cache read
/// to validate stored bytes.
pub trait RasterSource: Send + Sync {
    /// Builds the full request URL for a tile.
    fn build_request_url(&self, tile: &TileKey) -> String;

    /// Decodes a downloaded (or cached) body into an image.
    ///
    /// Used both to validate fresh downloads before they are promoted into
    /// the cache and to detect corrupt cache entries on read.
    fn decode_image(&self, bytes: &[u8]) -> Result<DynamicImage, SourceError>;

    /// File extension for cache entries produced by this source.
    fn file_extension(&self) -> &str;
}

/// Decodes bytes with the `image` crate, mapping errors to [`SourceError`].
pub(crate) fn decode_with_image_crate(bytes: &[u8]) -> Result<DynamicImage, SourceError> {
    image::load_from_memory(bytes).map_err(|e| SourceError::Decode(e.to_string()))
}
