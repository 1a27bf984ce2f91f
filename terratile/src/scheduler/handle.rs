//! Handle to a submitted tile job.
//!
//! # Example
//!
//! ```ignore
//! use terratile::scheduler::{JobState, Priority};
//!
//! let mut handle = scheduler.submit(layer, tile, Priority::ON_DEMAND);
//!
//! // Check state without waiting
//! if handle.state() == JobState::Running {
//!     println!("job is running");
//! }
//!
//! // Wait for the tile bytes (or cancel instead)
//! let bytes = handle.wait().await?;
//! ```

use crate::error::FetchError;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;

use super::job::{JobId, JobInner, JobState};

/// Handle to a submitted job.
///
/// Cloneable; all clones, and all handles returned for coalesced
/// submissions of the same tile, refer to the same underlying job and
/// resolve from its single execution. Cancelling any handle cancels that
/// shared job for every waiter.
pub struct JobHandle {
    job: Arc<JobInner>,
    state_rx: watch::Receiver<JobState>,
}

impl JobHandle {
    pub(super) fn new(job: Arc<JobInner>) -> Self {
        let state_rx = job.subscribe();
        Self { job, state_rx }
    }

    /// The job's identifier.
    pub fn id(&self) -> &JobId {
        self.job.id()
    }

    /// The current job state, without blocking.
    pub fn state(&self) -> JobState {
        self.job.state()
    }

    /// Requests cancellation of the job.
    ///
    /// Non-blocking. A queued job resolves as canceled without side
    /// effects; a running job stops at its next cancellation checkpoint.
    pub fn cancel(&self) {
        self.job.cancel_token().cancel();
    }

    /// Waits for the job to resolve and returns its outcome.
    pub async fn wait(&mut self) -> Result<Bytes, FetchError> {
        loop {
            if self.state().is_terminal() {
                break;
            }
            // Sender dropped means the scheduler tore down without
            // resolving the job.
            if self.state_rx.changed().await.is_err() {
                break;
            }
        }
        self.job
            .cloned_result()
            .unwrap_or(Err(FetchError::Canceled))
    }
}

impl Clone for JobHandle {
    fn clone(&self) -> Self {
        Self {
            job: Arc::clone(&self.job),
            state_rx: self.state_rx.clone(),
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.job.id())
            .field("state", &self.state())
            .finish()
    }
}
