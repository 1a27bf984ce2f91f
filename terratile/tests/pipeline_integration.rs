//! Integration tests for the tile fetch pipeline.
//!
//! These tests verify the complete flow including:
//! - submit → scheduler → fetcher → HTTP → disk cache → handle
//! - cache hits on resubmission
//! - failure markers across scheduler runs
//! - offline mode end to end
//!
//! Run with: `cargo test --test pipeline_integration`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use terratile::cache::{DiskCache, EntryStatus};
use terratile::config::FetchConfig;
use terratile::error::FetchError;
use terratile::fetch::{Fetcher, Layer};
use terratile::key::TileKey;
use terratile::scheduler::{JobState, Priority, TileScheduler};
use terratile::source::{BoxFuture, HttpClient, SourceError, WmsSource};

// ============================================================================
// Helper Functions
// ============================================================================

/// A decodable PNG body.
fn png_bytes() -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    let img = image::DynamicImage::new_rgb8(2, 2);
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// In-process tile server: serves a PNG for every URL unless a failure
/// route matches, and counts requests.
struct FakeTileServer {
    /// (url substring, error message) pairs; first match wins.
    failures: Mutex<Vec<(String, String)>>,
    requests: AtomicUsize,
}

impl FakeTileServer {
    fn serving_png() -> Self {
        Self {
            failures: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        }
    }

    fn fail_when(&self, substring: &str, message: &str) {
        self.failures
            .lock()
            .push((substring.to_string(), message.to_string()));
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl HttpClient for FakeTileServer {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .iter()
            .find(|(substring, _)| url.contains(substring.as_str()))
            .map(|(_, message)| message.clone());
        Box::pin(async move {
            match failure {
                Some(message) => Err(SourceError::Http(message)),
                None => Ok(Bytes::from(png_bytes())),
            }
        })
    }
}

struct Pipeline {
    _dir: TempDir,
    cache: Arc<DiskCache>,
    server: Arc<FakeTileServer>,
    scheduler: TileScheduler,
    layer: Arc<Layer>,
}

fn pipeline(config: FetchConfig) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(DiskCache::new(dir.path()));
    let server = Arc::new(FakeTileServer::serving_png());
    let source = Arc::new(WmsSource::new(
        "https://wms.example.com/service",
        "imagery",
    ));
    let layer = Arc::new(Layer::new(
        source.layer_key(),
        source,
        config.initial_timeout,
    ));
    let fetcher = Arc::new(Fetcher::new(
        Arc::clone(&cache),
        Arc::clone(&server) as Arc<dyn HttpClient>,
        config.clone(),
    ));
    let scheduler = TileScheduler::new(config, fetcher);
    Pipeline {
        _dir: dir,
        cache,
        server,
        scheduler,
        layer,
    }
}

/// A 4x4 block of level 4 tiles.
fn tile_block() -> Vec<TileKey> {
    let mut tiles = Vec::new();
    for row in 4..8 {
        for col in 4..8 {
            tiles.push(TileKey::from_grid(4, row, col, 256, 256).unwrap());
        }
    }
    tiles
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_batch_fetch_populates_cache() {
    let p = pipeline(FetchConfig::default().with_workers(4));
    let tiles = tile_block();

    let handles: Vec<_> = tiles
        .iter()
        .map(|tile| {
            p.scheduler
                .submit(Arc::clone(&p.layer), tile.clone(), Priority::PREFETCH)
        })
        .collect();
    p.scheduler.wait_idle().await;

    for mut handle in handles {
        assert!(handle.wait().await.is_ok());
        assert_eq!(handle.state(), JobState::Done);
    }
    assert_eq!(p.server.request_count(), tiles.len());

    for tile in &tiles {
        let path = p.cache.path_for(p.layer.key(), tile, "png");
        assert_eq!(p.cache.status(&path).unwrap(), EntryStatus::Valid);
    }

    p.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_resubmission_is_served_from_cache() {
    let p = pipeline(FetchConfig::default().with_workers(2));
    let tiles = tile_block();

    for tile in &tiles {
        p.scheduler
            .submit(Arc::clone(&p.layer), tile.clone(), Priority::PREFETCH);
    }
    p.scheduler.wait_idle().await;
    let first_pass = p.server.request_count();
    assert_eq!(first_pass, tiles.len());

    // Second pass: every tile comes off disk.
    let mut handles = Vec::new();
    for tile in &tiles {
        handles.push(p.scheduler.submit(
            Arc::clone(&p.layer),
            tile.clone(),
            Priority::PREFETCH,
        ));
    }
    p.scheduler.wait_idle().await;
    for mut handle in handles {
        assert!(handle.wait().await.is_ok());
    }
    assert_eq!(p.server.request_count(), first_pass);

    p.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_failure_marker_survives_resubmission() {
    let config = FetchConfig::default()
        .with_workers(2)
        .with_read_failed_flags(true)
        .with_write_failed_flags(true);
    let p = pipeline(config);

    let bad_tile = TileKey::from_grid(4, 4, 4, 256, 256).unwrap();
    let bad_url = {
        let e = bad_tile.extents();
        format!("BBOX={},{}", e.min_lon(), e.min_lat())
    };
    p.server.fail_when(&bad_url, "HTTP 404 Not Found");

    let mut handle = p
        .scheduler
        .submit(Arc::clone(&p.layer), bad_tile.clone(), Priority::ON_DEMAND);
    let result = handle.wait().await;
    assert!(matches!(result, Err(FetchError::DownloadFailed { .. })));
    assert_eq!(handle.state(), JobState::Failed);

    let path = p.cache.path_for(p.layer.key(), &bad_tile, "png");
    assert!(p.cache.has_failure_marker(&path));
    let requests_after_failure = p.server.request_count();

    // Resubmission short-circuits on the marker without touching the
    // network.
    let mut handle = p
        .scheduler
        .submit(Arc::clone(&p.layer), bad_tile, Priority::ON_DEMAND);
    let result = handle.wait().await;
    assert!(matches!(result, Err(FetchError::KnownFailure { .. })));
    assert_eq!(p.server.request_count(), requests_after_failure);

    p.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_offline_mode_end_to_end() {
    let p = pipeline(FetchConfig::default().with_workers(2));
    let tile = TileKey::from_grid(4, 5, 5, 256, 256).unwrap();

    // Populate the cache while online.
    let mut handle = p
        .scheduler
        .submit(Arc::clone(&p.layer), tile.clone(), Priority::ON_DEMAND);
    assert!(handle.wait().await.is_ok());
    let online_requests = p.server.request_count();

    p.layer.set_use_network(false);

    // Cached tile still resolves offline.
    let mut cached = p
        .scheduler
        .submit(Arc::clone(&p.layer), tile, Priority::ON_DEMAND);
    assert!(cached.wait().await.is_ok());

    // Uncached tile fails offline without a network request.
    let missing = TileKey::from_grid(4, 6, 6, 256, 256).unwrap();
    let mut handle = p
        .scheduler
        .submit(Arc::clone(&p.layer), missing, Priority::ON_DEMAND);
    let result = handle.wait().await;
    assert!(matches!(result, Err(FetchError::Offline { .. })));
    assert_eq!(p.server.request_count(), online_requests);

    p.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_mixed_outcomes_in_one_batch() {
    let config = FetchConfig::default()
        .with_workers(4)
        .with_write_failed_flags(true);
    let p = pipeline(config);

    let good = TileKey::from_grid(4, 7, 7, 256, 256).unwrap();
    let bad = TileKey::from_grid(4, 8, 8, 256, 256).unwrap();
    let bad_url = {
        let e = bad.extents();
        format!("BBOX={},{}", e.min_lon(), e.min_lat())
    };
    p.server.fail_when(&bad_url, "HTTP 500");

    let mut good_handle = p
        .scheduler
        .submit(Arc::clone(&p.layer), good.clone(), Priority::PREFETCH);
    let mut bad_handle = p
        .scheduler
        .submit(Arc::clone(&p.layer), bad.clone(), Priority::PREFETCH);
    p.scheduler.wait_idle().await;

    assert!(good_handle.wait().await.is_ok());
    assert!(bad_handle.wait().await.is_err());

    let good_path = p.cache.path_for(p.layer.key(), &good, "png");
    let bad_path = p.cache.path_for(p.layer.key(), &bad, "png");
    assert_eq!(p.cache.status(&good_path).unwrap(), EntryStatus::Valid);
    assert_eq!(p.cache.status(&bad_path).unwrap(), EntryStatus::Missing);
    assert!(p.cache.has_failure_marker(&bad_path));

    p.scheduler.shutdown().await;
}
