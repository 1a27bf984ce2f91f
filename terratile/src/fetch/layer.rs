//! Layer: a raster source bound to its cache identity and fetch state.

use crate::key::LayerKey;
use crate::source::RasterSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::retry::RetryState;

/// One configured raster layer.
///
/// Binds a [`LayerKey`] to the [`RasterSource`] that serves it, the
/// per-layer network flag, and the layer's [`RetryState`]. Layers are
/// shared as `Arc<Layer>` between the scheduler and its workers; all
/// mutable state is atomic.
pub struct Layer {
    key: LayerKey,
    source: Arc<dyn RasterSource>,
    use_network: AtomicBool,
    skip_disk_cache: bool,
    retry: RetryState,
}

impl Layer {
    /// Creates a layer with network enabled and the given initial download
    /// timeout.
    pub fn new(key: LayerKey, source: Arc<dyn RasterSource>, initial_timeout: Duration) -> Self {
        Self {
            key,
            source,
            use_network: AtomicBool::new(true),
            skip_disk_cache: false,
            retry: RetryState::new(initial_timeout),
        }
    }

    /// Always bypass the local cache and fetch from the network.
    pub fn with_skip_disk_cache(mut self, skip: bool) -> Self {
        self.skip_disk_cache = skip;
        self
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    pub fn source(&self) -> &dyn RasterSource {
        self.source.as_ref()
    }

    pub fn skip_disk_cache(&self) -> bool {
        self.skip_disk_cache
    }

    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Enables or disables network access for this layer.
    pub fn set_use_network(&self, enabled: bool) {
        self.use_network.store(enabled, Ordering::Release);
    }

    /// Whether this layer may contact the network, given the process-wide
    /// offline flag.
    pub fn uses_network(&self, work_offline: bool) -> bool {
        !work_offline && self.use_network.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("key", &self.key)
            .field("use_network", &self.use_network.load(Ordering::Relaxed))
            .field("skip_disk_cache", &self.skip_disk_cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::MockSource;

    fn layer() -> Layer {
        Layer::new(
            LayerKey::from_parts("wms1", 42),
            Arc::new(MockSource::new("https://example.com/tile")),
            Duration::from_millis(5000),
        )
    }

    #[test]
    fn test_network_enabled_by_default() {
        let layer = layer();
        assert!(layer.uses_network(false));
    }

    #[test]
    fn test_process_offline_overrides_layer_flag() {
        let layer = layer();
        assert!(!layer.uses_network(true));
    }

    #[test]
    fn test_per_layer_flag() {
        let layer = layer();
        layer.set_use_network(false);
        assert!(!layer.uses_network(false));
        layer.set_use_network(true);
        assert!(layer.uses_network(false));
    }

    #[test]
    fn test_skip_disk_cache_builder() {
        let layer = layer().with_skip_disk_cache(true);
        assert!(layer.skip_disk_cache());
    }
}
