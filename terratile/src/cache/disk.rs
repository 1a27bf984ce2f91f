//! Disk cache for rendered tiles.
//!
//! The [`DiskCache`] maps a (LayerKey, TileKey) pair to a filesystem path
//! under a configurable root, and answers existence/validity queries. It is
//! an explicitly constructed value passed by handle into the fetcher and
//! scheduler; there is no process-wide singleton. The root is fixed at
//! construction.
//!
//! Content validation is not attempted here; the fetcher decodes entries on
//! read and deletes the ones that fail. The cache's own integrity rule is
//! narrower: a zero-byte file is never a valid tile (it indicates a crashed
//! write) and is removed when observed.
//!
//! # Failure markers
//!
//! A permanent download failure can be remembered as a sibling marker file
//! with a `.failed` extension in place of the image extension. The marker's
//! text content is diagnostic only; callers test existence.

use crate::key::{LayerKey, TileKey};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::path;

/// Extension substituted for the image extension on failure markers.
const FAILURE_MARKER_EXTENSION: &str = "failed";

/// Errors from cache filesystem operations.
///
/// A cache that cannot write must disable itself rather than thrash, so
/// these are never swallowed; the fetcher degrades to direct network fetch
/// and the caller decides whether to keep going.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("cache I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Observed state of a cache entry on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// No file at the path.
    Missing,
    /// A zero-byte file was found (and removed).
    Empty,
    /// A non-empty file exists.
    Valid,
}

/// Deterministic, collision-free mapping from tile identity to files under
/// a cache root.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Creates a cache rooted at `root`.
    ///
    /// The root is fixed for the lifetime of the value; concurrent fetches
    /// rely on every worker deriving paths from the same root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Composes the cache path for a tile.
    ///
    /// Equal keys always yield the identical path; any differing field
    /// yields a different one.
    pub fn path_for(&self, layer: &LayerKey, tile: &TileKey, extension: &str) -> PathBuf {
        path::path_for(&self.root, layer, tile, extension)
    }

    /// Creates all parent directories for a cache entry path.
    ///
    /// Concurrent callers racing to create the same directory are not an
    /// error; `create_dir_all` treats an existing directory as success.
    pub fn ensure_directory(&self, entry_path: &Path) -> Result<(), CacheError> {
        let Some(parent) = entry_path.parent() else {
            return Ok(());
        };
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, &e))
    }

    /// Reports the status of a cache entry.
    ///
    /// A zero-byte file is removed as a side effect and reported as
    /// [`EntryStatus::Empty`]; a subsequent call reports `Missing`.
    pub fn status(&self, entry_path: &Path) -> Result<EntryStatus, CacheError> {
        let metadata = match std::fs::metadata(entry_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(EntryStatus::Missing);
            }
            Err(e) => return Err(CacheError::io(entry_path, &e)),
        };

        if metadata.len() == 0 {
            debug!(path = %entry_path.display(), "removing zero-byte cache entry");
            match std::fs::remove_file(entry_path) {
                Ok(()) => {}
                // Another worker may have removed it first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(entry_path, &e)),
            }
            return Ok(EntryStatus::Empty);
        }

        Ok(EntryStatus::Valid)
    }

    /// Removes the entire cache subtree for a layer.
    ///
    /// Used when a layer's remote definition changes and every cached tile
    /// for it becomes stale.
    pub fn invalidate(&self, layer: &LayerKey) -> Result<(), CacheError> {
        let subtree = self
            .root
            .join(layer.name())
            .join(format!("{:x}", layer.id()));
        match std::fs::remove_dir_all(&subtree) {
            Ok(()) => {
                debug!(layer = %layer, path = %subtree.display(), "invalidated layer cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(subtree, &e)),
        }
    }

    /// The failure-marker path for a cache entry.
    pub fn failure_marker_path(&self, entry_path: &Path) -> PathBuf {
        entry_path.with_extension(FAILURE_MARKER_EXTENSION)
    }

    /// Returns true if a failure marker exists for the entry.
    pub fn has_failure_marker(&self, entry_path: &Path) -> bool {
        self.failure_marker_path(entry_path).exists()
    }

    /// Records a permanent download failure next to the cache path.
    ///
    /// Marker content is plain text for operators reading the cache tree;
    /// nothing machine-parses it beyond existence.
    pub fn write_failure_marker(&self, entry_path: &Path, detail: &str) -> Result<(), CacheError> {
        self.ensure_directory(entry_path)?;
        let marker = self.failure_marker_path(entry_path);
        let body = format!("{}\n{}\n", chrono::Utc::now().to_rfc3339(), detail);
        std::fs::write(&marker, body).map_err(|e| CacheError::io(&marker, &e))
    }

    /// Removes a failure marker if one exists.
    ///
    /// Called after a successful download so a tile that recovered on the
    /// server is not still reported as a known failure.
    pub fn clear_failure_marker(&self, entry_path: &Path) {
        let marker = self.failure_marker_path(entry_path);
        match std::fs::remove_file(&marker) {
            Ok(()) => debug!(path = %marker.display(), "cleared failure marker"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %marker.display(), error = %e, "failed to clear failure marker"),
        }
    }
}
