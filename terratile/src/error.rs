//! Fetch error taxonomy.
//!
//! All variants carry enough context (URL, path, layer name) to log without
//! the caller reconstructing it. The scheduler forwards these to job handles
//! unchanged. Every variant is `Clone`: a coalesced execution resolves many
//! handles from one terminal error.

use crate::cache::CacheError;
use std::path::PathBuf;
use thiserror::Error;

/// Terminal outcome of a tile fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The caller canceled the fetch. Recovered silently; the consumer
    /// drops the tile for this frame. Never writes a failure marker.
    #[error("fetch canceled")]
    Canceled,

    /// Every attempt hit the per-attempt deadline. The layer's timeout was
    /// escalated along the way; no failure marker is written (a timeout is
    /// not a verdict about the resource).
    #[error("download timed out after {attempts} attempts ({timeout_ms} ms final) for {url}")]
    TimedOut {
        url: String,
        attempts: u32,
        timeout_ms: u64,
    },

    /// The layer is configured offline (process-wide or per-layer); the
    /// network was never contacted.
    #[error("layer {layer} is offline")]
    Offline { layer: String },

    /// A failure marker recorded a prior permanent failure for this tile;
    /// no network attempt was made.
    #[error("known failure recorded at {path}")]
    KnownFailure { path: PathBuf },

    /// The download failed, or produced an empty or undecodable body.
    /// May have written a failure marker.
    #[error("download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The cache subsystem itself failed. Fatal for caching; the fetcher
    /// falls back to direct network fetch where it can.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl FetchError {
    /// Returns true for outcomes the consumer recovers from silently.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
