//! Terratile - tile caching and network fetch pipeline for raster layers
//!
//! This library fetches map tiles from raster servers, caches them on disk
//! in a deterministic layout, and schedules concurrent fetches through a
//! priority worker pool with request coalescing.
//!
//! # High-Level API
//!
//! ```ignore
//! use terratile::cache::DiskCache;
//! use terratile::config::FetchConfig;
//! use terratile::fetch::{Fetcher, Layer};
//! use terratile::scheduler::{Priority, TileScheduler};
//! use terratile::source::{ReqwestClient, WmsSource};
//! use std::sync::Arc;
//!
//! let config = FetchConfig::default();
//! let source = Arc::new(WmsSource::new("https://wms.example.com/service", "imagery"));
//! let layer = Arc::new(Layer::new(source.layer_key(), source, config.initial_timeout));
//!
//! let cache = Arc::new(DiskCache::new("/var/cache/terratile"));
//! let http = Arc::new(ReqwestClient::new()?);
//! let fetcher = Arc::new(Fetcher::new(cache, http, config.clone()));
//!
//! let scheduler = TileScheduler::new(config, fetcher);
//! let tile = terratile::key::TileKey::from_grid(5, 12, 30, 256, 256)?;
//! let bytes = scheduler.submit(layer, tile, Priority::ON_DEMAND).wait().await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod key;
pub mod scheduler;
pub mod source;

/// Version of the terratile library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
