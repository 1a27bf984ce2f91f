//! Fetch pipeline configuration.
//!
//! Defaults live here as documented constants; components take a
//! [`FetchConfig`] by value at construction. Builder-style `with_*` methods
//! cover the common overrides.

use std::time::Duration;

/// Default maximum download attempts per tile (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default initial per-attempt download timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default multiplier applied to a layer's timeout after an observed timeout.
pub const DEFAULT_TIMEOUT_BACKOFF: f64 = 2.0;

/// Configuration consumed by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum download attempts per tile, including the first.
    pub max_attempts: u32,

    /// Initial per-attempt timeout for new layers.
    pub initial_timeout: Duration,

    /// Timeout escalation factor applied after each observed timeout.
    pub timeout_backoff: f64,

    /// Honor failure markers: a recorded failure short-circuits the fetch.
    pub read_failed_flags: bool,

    /// Record permanent download failures as marker files.
    pub write_failed_flags: bool,

    /// Start in process-wide offline mode.
    pub work_offline: bool,

    /// Worker tasks in the scheduler pool.
    pub workers: usize,
}

/// Worker pool size when the host's parallelism cannot be determined.
pub const FALLBACK_WORKERS: usize = 4;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKERS)
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            timeout_backoff: DEFAULT_TIMEOUT_BACKOFF,
            read_failed_flags: false,
            write_failed_flags: false,
            work_offline: false,
            workers: default_workers(),
        }
    }
}

impl FetchConfig {
    /// Sets the maximum number of download attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial per-attempt timeout.
    pub fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Sets the timeout escalation factor.
    pub fn with_timeout_backoff(mut self, factor: f64) -> Self {
        self.timeout_backoff = factor;
        self
    }

    /// Enables or disables reading failure markers.
    pub fn with_read_failed_flags(mut self, enabled: bool) -> Self {
        self.read_failed_flags = enabled;
        self
    }

    /// Enables or disables writing failure markers.
    pub fn with_write_failed_flags(mut self, enabled: bool) -> Self {
        self.write_failed_flags = enabled;
        self
    }

    /// Starts the pipeline in offline mode.
    pub fn with_work_offline(mut self, offline: bool) -> Self {
        self.work_offline = offline;
        self
    }

    /// Sets the scheduler worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}
