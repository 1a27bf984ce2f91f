//! Job identity and shared per-job state.

use crate::cache::path::relative_stem;
use crate::error::FetchError;
use crate::fetch::Layer;
use crate::key::TileKey;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Identifies a tile job.
///
/// Two submissions carry the same id exactly when they address the same
/// cache slot, which is what makes the id usable as the coalescing key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobId(Arc<str>);

impl JobId {
    pub(super) fn for_tile(layer: &Layer, tile: &TileKey) -> Self {
        Self(relative_stem(layer.key(), tile).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// `Queued -> Running -> {Done | Failed | Canceled}`; a queued job may also
/// move straight to `Canceled` without ever running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JobState {
    /// Waiting in the priority queue.
    #[default]
    Queued,

    /// A worker is executing the fetch.
    Running,

    /// Completed with tile bytes.
    Done,

    /// Completed with a fetch error.
    Failed,

    /// Canceled before or during execution.
    Canceled,
}

impl JobState {
    /// Returns true once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Running => write!(f, "Running"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
            Self::Canceled => write!(f, "Canceled"),
        }
    }
}

/// State shared between the scheduler, its workers, and every handle to one
/// job.
///
/// The result slot is written exactly once, before the terminal state is
/// broadcast; handles woken by the watch channel then clone it, so any
/// number of coalesced waiters resolve from the same execution.
pub(super) struct JobInner {
    id: JobId,
    layer: Arc<Layer>,
    tile: TileKey,
    state_tx: watch::Sender<JobState>,
    result: Mutex<Option<Result<Bytes, FetchError>>>,
    cancel: CancellationToken,
}

impl JobInner {
    pub fn new(layer: Arc<Layer>, tile: TileKey) -> Self {
        let id = JobId::for_tile(&layer, &tile);
        let (state_tx, _state_rx) = watch::channel(JobState::Queued);
        Self {
            id,
            layer,
            tile,
            state_tx,
            result: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn tile(&self) -> &TileKey {
        &self.tile
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn state(&self) -> JobState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }

    /// Marks the job as running.
    pub fn set_running(&self) {
        let _ = self.state_tx.send(JobState::Running);
    }

    /// Records the outcome and broadcasts the matching terminal state.
    pub fn resolve(&self, outcome: Result<Bytes, FetchError>) {
        let state = match &outcome {
            Ok(_) => JobState::Done,
            Err(e) if e.is_canceled() => JobState::Canceled,
            Err(_) => JobState::Failed,
        };
        *self.result.lock() = Some(outcome);
        let _ = self.state_tx.send(state);
    }

    /// Resolves the job as canceled without executing it.
    pub fn resolve_canceled(&self) {
        self.resolve(Err(FetchError::Canceled));
    }

    /// The recorded outcome, if the job has resolved.
    pub fn cloned_result(&self) -> Option<Result<Bytes, FetchError>> {
        self.result.lock().clone()
    }
}
