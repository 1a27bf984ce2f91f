//! Terratile CLI - batch tile prefetcher
//!
//! Downloads every tile of a bounding box across a range of levels into the
//! disk cache, with progress reporting. A populated cache can then be used
//! offline.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use terratile::cache::DiskCache;
use terratile::config::FetchConfig;
use terratile::error::FetchError;
use terratile::fetch::{Fetcher, Layer};
use terratile::key::{BoundingBox, TileKey, MAX_LEVEL};
use terratile::scheduler::{Priority, TileScheduler};
use terratile::source::{RasterSource, ReqwestClient, TemplateSource, WmsSource};
use tracing::warn;

#[derive(Parser)]
#[command(name = "terratile")]
#[command(version = terratile::VERSION)]
#[command(about = "Prefetch raster tiles into a local cache", long_about = None)]
struct Args {
    /// Cache root directory
    #[arg(long)]
    cache_dir: String,

    /// Bounding box as min_lon,min_lat,max_lon,max_lat (decimal degrees)
    #[arg(long)]
    bbox: String,

    /// Level or level range to fetch, e.g. "5" or "3-6"
    #[arg(long, default_value = "5")]
    levels: String,

    /// WMS endpoint URL
    #[arg(long, conflicts_with = "template")]
    wms_url: Option<String>,

    /// WMS layer list (required with --wms-url)
    #[arg(long, requires = "wms_url")]
    wms_layers: Option<String>,

    /// URL template with {level}/{row}/{col} placeholders
    #[arg(long, required_unless_present = "wms_url")]
    template: Option<String>,

    /// Requested WMS image format
    #[arg(long, default_value = "image/png")]
    format: String,

    /// Tile width and height in pixels
    #[arg(long, default_value = "256")]
    tile_size: u32,

    /// Worker pool size (defaults to available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Initial per-attempt download timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Maximum download attempts per tile
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Record permanent download failures as marker files
    #[arg(long)]
    write_failed_flags: bool,

    /// Skip tiles with a recorded failure
    #[arg(long)]
    read_failed_flags: bool,
}

/// Parses "5" or "3-6" into an inclusive level range.
fn parse_levels(value: &str) -> Result<(u32, u32), String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid level: {}", s))
    };
    let (low, high) = match value.split_once('-') {
        Some((low, high)) => {
            let (low, high) = (parse(low)?, parse(high)?);
            if low > high {
                return Err(format!("empty level range: {}", value));
            }
            (low, high)
        }
        None => {
            let level = parse(value)?;
            (level, level)
        }
    };
    if high > MAX_LEVEL {
        return Err(format!(
            "level {} exceeds the supported maximum {}",
            high, MAX_LEVEL
        ));
    }
    Ok((low, high))
}

/// Parses "min_lon,min_lat,max_lon,max_lat".
fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("invalid bounding box: {}", value))?;
    if parts.len() != 4 {
        return Err(format!(
            "bounding box needs 4 comma-separated values, got {}",
            parts.len()
        ));
    }
    BoundingBox::new(parts[0], parts[1], parts[2], parts[3]).map_err(|e| e.to_string())
}

/// Enumerates the tiles of one level that intersect the bounding box.
fn tiles_for_level(bbox: &BoundingBox, level: u32, size: u32) -> Vec<TileKey> {
    let span = 180.0 / (1u64 << level) as f64;
    let cols = 1u64 << (level + 1);
    let rows = 1u64 << level;

    let col_min = (((bbox.min_lon() + 180.0) / span).floor() as i64).clamp(0, cols as i64 - 1);
    let col_max = (((bbox.max_lon() + 180.0) / span).ceil() as i64 - 1).clamp(0, cols as i64 - 1);
    let row_min = (((bbox.min_lat() + 90.0) / span).floor() as i64).clamp(0, rows as i64 - 1);
    let row_max = (((bbox.max_lat() + 90.0) / span).ceil() as i64 - 1).clamp(0, rows as i64 - 1);

    let mut tiles = Vec::new();
    for row in row_min..=row_max {
        for col in col_min..=col_max {
            if let Ok(tile) = TileKey::from_grid(level, row as u32, col as u32, size, size) {
                tiles.push(tile);
            }
        }
    }
    tiles
}

fn build_source(args: &Args) -> (terratile::key::LayerKey, Arc<dyn RasterSource>) {
    if let Some(wms_url) = &args.wms_url {
        let layers = args.wms_layers.as_deref().unwrap_or_default();
        let source = WmsSource::new(wms_url, layers).with_format(&args.format);
        (source.layer_key(), Arc::new(source))
    } else {
        // clap guarantees template is present when wms_url is absent.
        let source = TemplateSource::new(args.template.as_deref().unwrap_or_default());
        (source.layer_key(), Arc::new(source))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let bbox = match parse_bbox(&args.bbox) {
        Ok(bbox) => bbox,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let (level_min, level_max) = match parse_levels(&args.levels) {
        Ok(range) => range,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let config = {
        let mut config = FetchConfig::default()
            .with_initial_timeout(Duration::from_millis(args.timeout_ms))
            .with_max_attempts(args.max_attempts)
            .with_read_failed_flags(args.read_failed_flags)
            .with_write_failed_flags(args.write_failed_flags);
        if let Some(workers) = args.workers {
            config = config.with_workers(workers);
        }
        config
    };

    let (layer_key, source) = build_source(&args);
    let layer = Arc::new(Layer::new(layer_key, source, config.initial_timeout));

    let http = match ReqwestClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Error creating HTTP client: {}", e);
            process::exit(1);
        }
    };
    let cache = Arc::new(DiskCache::new(&args.cache_dir));
    let fetcher = Arc::new(Fetcher::new(cache, http, config.clone()));
    let scheduler = TileScheduler::new(config, fetcher);

    let tiles: Vec<TileKey> = (level_min..=level_max)
        .flat_map(|level| tiles_for_level(&bbox, level, args.tile_size))
        .collect();
    println!(
        "Fetching {} tiles (levels {}-{}) for layer {}",
        tiles.len(),
        level_min,
        level_max,
        layer.key()
    );

    let progress = ProgressBar::new(tiles.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let handles: Vec<_> = tiles
        .into_iter()
        .map(|tile| scheduler.submit(Arc::clone(&layer), tile, Priority::PREFETCH))
        .collect();

    let mut fetched = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for mut handle in handles {
        match handle.wait().await {
            Ok(_) => fetched += 1,
            Err(FetchError::KnownFailure { .. }) => skipped += 1,
            Err(e) => {
                warn!(job = %handle.id(), error = %e, "tile failed");
                failed += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    scheduler.shutdown().await;

    println!(
        "Done: {} fetched, {} skipped (known failures), {} failed",
        fetched, skipped, failed
    );
    if failed > 0 {
        process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels_single() {
        assert_eq!(parse_levels("5").unwrap(), (5, 5));
    }

    #[test]
    fn test_parse_levels_range() {
        assert_eq!(parse_levels("3-6").unwrap(), (3, 6));
    }

    #[test]
    fn test_parse_levels_rejects_garbage() {
        assert!(parse_levels("x").is_err());
        assert!(parse_levels("6-3").is_err());
    }

    #[test]
    fn test_parse_levels_rejects_levels_beyond_maximum() {
        // tiles_for_level shifts 1u64 by level + 1; unbounded input would
        // overflow the shift.
        assert!(parse_levels("63").is_err());
        assert!(parse_levels("5-100").is_err());
        assert!(parse_levels(&MAX_LEVEL.to_string()).is_ok());
    }

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("-10.5, -5, 10, 20").unwrap();
        assert_eq!(bbox.min_lon(), -10.5);
        assert_eq!(bbox.max_lat(), 20.0);
    }

    #[test]
    fn test_parse_bbox_rejects_wrong_arity() {
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("").is_err());
    }

    #[test]
    fn test_tiles_for_level_zero_covers_world() {
        let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).unwrap();
        let tiles = tiles_for_level(&world, 0, 256);
        assert_eq!(tiles.len(), 2);
    }

    #[test]
    fn test_tiles_for_level_small_box() {
        // A box inside a single level 3 tile (span 22.5 degrees).
        let bbox = BoundingBox::new(1.0, 1.0, 2.0, 2.0).unwrap();
        let tiles = tiles_for_level(&bbox, 3, 256);
        assert_eq!(tiles.len(), 1);
        let extents = tiles[0].extents();
        assert!(extents.min_lon() <= 1.0 && extents.max_lon() >= 2.0);
        assert!(extents.min_lat() <= 1.0 && extents.max_lat() >= 2.0);
    }

    #[test]
    fn test_tiles_clamped_to_grid() {
        // Box hugging the antimeridian corner.
        let bbox = BoundingBox::new(170.0, 80.0, 180.0, 90.0).unwrap();
        let tiles = tiles_for_level(&bbox, 2, 256);
        assert!(!tiles.is_empty());
        for tile in tiles {
            assert!(tile.col() < 8);
            assert!(tile.row() < 4);
        }
    }
}
