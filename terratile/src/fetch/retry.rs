//! Retry policy and per-layer escalating timeout.
//!
//! [`RetryPolicy`] is pure value-level logic with no I/O, unit-testable in
//! isolation from networking. [`RetryState`] is the mutable per-layer piece:
//! the current download timeout, escalated after each observed timeout and
//! shared by every in-flight tile of the layer, so it is updated atomically.

use crate::config::FetchConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Decides whether another download attempt is allowed and how the timeout
/// escalates between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            backoff_multiplier,
        }
    }

    /// Returns true if another attempt may follow `completed_attempts`.
    pub fn should_retry(&self, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts
    }

    /// The escalated timeout following a timed-out attempt.
    pub fn next_timeout(&self, current: Duration) -> Duration {
        let millis = (current.as_millis() as f64 * self.backoff_multiplier).round() as u64;
        Duration::from_millis(millis.max(1))
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self::new(config.max_attempts, config.timeout_backoff)
    }
}

/// Per-layer escalating download timeout.
///
/// Scoped to one layer instance and shared by all of its in-flight tiles;
/// escalation persists across tiles for the lifetime of the layer and is
/// reset only when the layer is recreated.
#[derive(Debug)]
pub struct RetryState {
    timeout_ms: AtomicU64,
}

impl RetryState {
    pub fn new(initial: Duration) -> Self {
        Self {
            timeout_ms: AtomicU64::new(initial.as_millis().max(1) as u64),
        }
    }

    /// The current per-attempt timeout.
    pub fn current_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Acquire))
    }

    /// Escalates the timeout after an observed timeout.
    ///
    /// Atomic read-modify-write: concurrent tiles of the same layer may
    /// escalate simultaneously without losing an update.
    pub fn escalate(&self, policy: &RetryPolicy) -> Duration {
        let previous = self
            .timeout_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(
                    policy
                        .next_timeout(Duration::from_millis(current))
                        .as_millis() as u64,
                )
            })
            .expect("fetch_update closure always returns Some");
        policy.next_timeout(Duration::from_millis(previous))
    }
}
