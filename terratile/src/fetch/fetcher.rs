//! Tile fetcher: cache probe, network download, cache promotion.
//!
//! One [`Fetcher::fetch`] call produces valid tile bytes for a
//! (layer, tile) pair, using the disk cache when possible and the network
//! otherwise, under a caller-supplied cancellation token.
//!
//! ```text
//! fetch ──► failure marker? ──► ErrKnownFailure
//!             │
//!             ▼
//!         cache probe ──► valid + decodable ──► return bytes
//!             │ miss/corrupt
//!             ▼
//!         offline? ──► ErrOffline
//!             │
//!             ▼
//!         download (timeout raced with cancellation, retried with
//!         per-layer escalating deadline) ──► validate ──► promote ──► bytes
//! ```
//!
//! The download is promoted through a temporary sibling file and an atomic
//! rename, so a crash mid-write never leaves a half-written file at the
//! final cache path.

use crate::cache::{DiskCache, EntryStatus};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::key::TileKey;
use crate::source::HttpClient;
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::layer::Layer;
use super::retry::RetryPolicy;

/// Tile fetch engine.
///
/// Holds the cache handle, the HTTP client, and the process-wide offline
/// switch. Cheap to share: workers call [`fetch`](Self::fetch) concurrently.
pub struct Fetcher {
    cache: Arc<DiskCache>,
    http: Arc<dyn HttpClient>,
    config: FetchConfig,
    policy: RetryPolicy,
    work_offline: AtomicBool,
}

impl Fetcher {
    pub fn new(cache: Arc<DiskCache>, http: Arc<dyn HttpClient>, config: FetchConfig) -> Self {
        let policy = RetryPolicy::from(&config);
        let work_offline = AtomicBool::new(config.work_offline);
        Self {
            cache,
            http,
            config,
            policy,
            work_offline,
        }
    }

    /// The cache this fetcher promotes downloads into.
    pub fn cache(&self) -> &Arc<DiskCache> {
        &self.cache
    }

    /// Flips the process-wide offline switch.
    pub fn set_work_offline(&self, offline: bool) {
        self.work_offline.store(offline, Ordering::Release);
    }

    pub fn work_offline(&self) -> bool {
        self.work_offline.load(Ordering::Acquire)
    }

    /// Produces tile bytes for one (layer, tile) pair.
    ///
    /// Cancellation is cooperative: the token is checked before each phase
    /// and raced against the download itself. A canceled fetch leaves no
    /// temp file and writes no failure marker; cancellation is not a
    /// verdict about the resource.
    pub async fn fetch(
        &self,
        layer: &Layer,
        tile: &TileKey,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        let extension = layer.source().file_extension();
        let path = self.cache.path_for(layer.key(), tile, extension);

        if self.config.read_failed_flags && self.cache.has_failure_marker(&path) {
            debug!(layer = %layer.key(), tile = %tile, "short-circuit on recorded failure");
            return Err(FetchError::KnownFailure { path });
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }

        if !layer.skip_disk_cache() {
            if let Some(bytes) = self.read_cached(layer, &path).await {
                return Ok(bytes);
            }
        }

        if !layer.uses_network(self.work_offline()) {
            return Err(FetchError::Offline {
                layer: layer.key().name().to_string(),
            });
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }
        let url = layer.source().build_request_url(tile);

        let bytes = self.download_with_retry(layer, &path, &url, cancel).await?;

        if bytes.is_empty() {
            return Err(self.download_failed(layer, &path, &url, "empty response body"));
        }
        if let Err(e) = layer.source().decode_image(&bytes) {
            return Err(self.download_failed(layer, &path, &url, &e.to_string()));
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }

        self.promote(&path, extension, &bytes, layer, &url).await;
        Ok(bytes)
    }

    /// Reads and validates an existing cache entry.
    ///
    /// Returns `None` on miss, on a corrupt entry (which is deleted so the
    /// network path can replace it), or when the cache itself fails; a
    /// broken cache degrades to direct network fetch rather than aborting.
    async fn read_cached(&self, layer: &Layer, path: &Path) -> Option<Bytes> {
        match self.cache.status(path) {
            Ok(EntryStatus::Valid) => {}
            Ok(_) => return None,
            Err(e) => {
                warn!(layer = %layer.key(), error = %e, "cache probe failed; fetching direct");
                return None;
            }
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache read failed; fetching direct");
                return None;
            }
        };

        match layer.source().decode_image(&bytes) {
            Ok(_) => {
                debug!(layer = %layer.key(), path = %path.display(), "cache hit");
                Some(bytes)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry removed");
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove corrupt entry");
                }
                None
            }
        }
    }

    /// Downloads the tile body, retrying timed-out attempts with the
    /// layer's escalating deadline.
    ///
    /// Only timeouts are retried; any other transport error is terminal for
    /// this fetch. The escalated timeout sticks on the layer and applies to
    /// subsequent fetches of any of its tiles.
    async fn download_with_retry(
        &self,
        layer: &Layer,
        path: &Path,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let timeout = layer.retry().current_timeout();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Canceled),
                outcome = tokio::time::timeout(timeout, self.http.get(url)) => outcome,
            };

            match outcome {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) => {
                    return Err(self.download_failed(layer, path, url, &e.to_string()));
                }
                Err(_elapsed) => {
                    if self.policy.should_retry(attempt) {
                        let escalated = layer.retry().escalate(&self.policy);
                        warn!(
                            layer = %layer.key(),
                            url,
                            attempt,
                            timeout_ms = timeout.as_millis() as u64,
                            next_timeout_ms = escalated.as_millis() as u64,
                            "download timed out; retrying with escalated deadline"
                        );
                        continue;
                    }
                    return Err(FetchError::TimedOut {
                        url: url.to_string(),
                        attempts: attempt,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Records a terminal download failure and builds its error value.
    ///
    /// Writes a failure marker when configured; timeouts never come through
    /// here.
    fn download_failed(&self, layer: &Layer, path: &Path, url: &str, reason: &str) -> FetchError {
        warn!(layer = %layer.key(), url, reason, "download failed");
        if self.config.write_failed_flags {
            let detail = format!("layer: {}\nurl: {}\nreason: {}", layer.key(), url, reason);
            if let Err(e) = self.cache.write_failure_marker(path, &detail) {
                warn!(error = %e, "failed to write failure marker");
            }
        }
        FetchError::DownloadFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Promotes downloaded bytes into the cache.
    ///
    /// Writes to a `.part` temporary sibling and renames into place. Cache
    /// failures here are logged, not surfaced: the bytes are already valid
    /// and the caller gets them either way.
    async fn promote(&self, path: &Path, extension: &str, bytes: &Bytes, layer: &Layer, url: &str) {
        if let Err(e) = self.cache.ensure_directory(path) {
            warn!(layer = %layer.key(), url, error = %e, "cache disabled for this tile");
            return;
        }

        let temp = path.with_extension(format!("{}.part", extension));
        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            warn!(path = %temp.display(), error = %e, "temp write failed; tile not cached");
            let _ = std::fs::remove_file(&temp);
            return;
        }
        if let Err(e) = tokio::fs::rename(&temp, path).await {
            warn!(path = %path.display(), error = %e, "cache promote failed");
            let _ = std::fs::remove_file(&temp);
            return;
        }

        self.cache.clear_failure_marker(path);
        debug!(layer = %layer.key(), path = %path.display(), bytes = bytes.len(), "tile cached");
    }
}
