//! Tile job scheduler: a worker pool over a shared priority queue.
//!
//! ```text
//! submit ──► coalesce on job id ──► priority queue
//!                                       │
//!                     workers ──► pop (skip canceled, defer
//!                                 conflicting keys) ──► Fetcher::fetch
//!                                       │
//!                                 resolve handle(s)
//! ```
//!
//! Duplicate submissions of the same (layer, tile) while a job is queued or
//! running coalesce onto one execution; every returned [`JobHandle`]
//! resolves from it. At most one job per cache slot is ever in flight:
//! workers consult the in-flight key set at dequeue time and defer a
//! conflicting entry until the key completes.
//!
//! # Example
//!
//! ```ignore
//! use terratile::scheduler::{Priority, TileScheduler};
//!
//! let scheduler = TileScheduler::new(config, fetcher);
//! let mut handle = scheduler.submit(layer, tile, Priority::ON_DEMAND);
//! let bytes = handle.wait().await?;
//! scheduler.shutdown().await;
//! ```

mod handle;
mod job;
mod queue;

pub use handle::JobHandle;
pub use job::{JobId, JobState};
pub use queue::Priority;

use crate::config::FetchConfig;
use crate::fetch::{Fetcher, Layer};
use crate::key::TileKey;
use job::JobInner;
use parking_lot::Mutex;
use queue::{PriorityQueue, QueuedJob};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Point-in-time scheduler counters.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    /// Jobs waiting in the queue (including deferred entries).
    pub queued: usize,

    /// Jobs currently executing.
    pub running: usize,

    /// Ids of the currently executing jobs.
    pub running_names: Vec<String>,
}

struct SchedulerState {
    queue: PriorityQueue,
    /// Every non-terminal job, keyed by id, for submit-time coalescing.
    jobs: HashMap<JobId, Arc<JobInner>>,
    /// Keys currently being executed by a worker.
    in_flight: HashSet<JobId>,
    /// Popped jobs whose key was in flight; requeued when the key frees up.
    deferred: Vec<QueuedJob>,
}

struct Shared {
    fetcher: Arc<Fetcher>,
    state: Mutex<SchedulerState>,
    work_available: Notify,
    /// Bumped on every state transition; `wait_idle` subscribes to it.
    activity: watch::Sender<u64>,
    shutdown: CancellationToken,
}

impl Shared {
    fn bump(&self) {
        self.activity.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Removes the job from the coalescing map, unless a newer job has
    /// already replaced it under the same id.
    fn detach(state: &mut SchedulerState, job: &Arc<JobInner>) {
        if let Some(current) = state.jobs.get(job.id()) {
            if Arc::ptr_eq(current, job) {
                state.jobs.remove(job.id());
            }
        }
    }
}

/// Worker pool executing tile fetch jobs from a shared priority queue.
pub struct TileScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TileScheduler {
    /// Creates the scheduler and spawns its worker pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: FetchConfig, fetcher: Arc<Fetcher>) -> Self {
        let worker_count = config.workers.max(1);
        let shared = Arc::new(Shared {
            fetcher,
            state: Mutex::new(SchedulerState {
                queue: PriorityQueue::new(),
                jobs: HashMap::new(),
                in_flight: HashSet::new(),
                deferred: Vec::new(),
            }),
            work_available: Notify::new(),
            activity: watch::channel(0).0,
            shutdown: CancellationToken::new(),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let shared = Arc::clone(&shared);
                tokio::spawn(Self::worker(shared, index))
            })
            .collect();

        info!(workers = worker_count, "tile scheduler started");
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Submits a tile for fetching.
    ///
    /// If a job for the same cache slot is already queued or running (and
    /// not canceled), the returned handle is attached to it instead of
    /// scheduling duplicate work.
    pub fn submit(&self, layer: Arc<Layer>, tile: TileKey, priority: Priority) -> JobHandle {
        if self.shared.shutdown.is_cancelled() {
            let job = Arc::new(JobInner::new(layer, tile));
            job.resolve_canceled();
            return JobHandle::new(job);
        }

        let job = Arc::new(JobInner::new(layer, tile));
        let handle = {
            let mut state = self.shared.state.lock();
            if let Some(existing) = state.jobs.get(job.id()) {
                if !existing.cancel_token().is_cancelled() {
                    debug!(job = %job.id(), "submission coalesced onto in-flight job");
                    return JobHandle::new(Arc::clone(existing));
                }
            }
            debug!(job = %job.id(), priority = %priority, "job queued");
            state.jobs.insert(job.id().clone(), Arc::clone(&job));
            state.queue.push(Arc::clone(&job), priority);
            JobHandle::new(job)
        };
        self.shared.bump();
        self.shared.work_available.notify_one();
        handle
    }

    /// Cancels every queued and running job.
    ///
    /// Queued jobs resolve as canceled without side effects; running jobs
    /// stop at their next cancellation checkpoint.
    pub fn cancel_all(&self) {
        let jobs: Vec<Arc<JobInner>> = {
            let state = self.shared.state.lock();
            state.jobs.values().cloned().collect()
        };
        info!(jobs = jobs.len(), "cancelling all jobs");
        for job in jobs {
            job.cancel_token().cancel();
        }
        // Wake idle workers so canceled queue entries resolve promptly.
        self.shared.work_available.notify_waiters();
    }

    /// Waits until the queue is empty and no job is running.
    pub async fn wait_idle(&self) {
        let mut activity = self.shared.activity.subscribe();
        loop {
            {
                let state = self.shared.state.lock();
                if state.queue.is_empty() && state.deferred.is_empty() && state.in_flight.is_empty()
                {
                    return;
                }
            }
            if activity.changed().await.is_err() {
                return;
            }
        }
    }

    /// Current queue depth and running set, without blocking execution.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            queued: state.queue.len() + state.deferred.len(),
            running: state.in_flight.len(),
            running_names: state.in_flight.iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Stops the worker pool and resolves every outstanding job as
    /// canceled.
    ///
    /// Returns once all workers have exited.
    pub async fn shutdown(&self) {
        info!("tile scheduler shutting down");
        self.shared.shutdown.cancel();
        self.cancel_all();

        {
            let mut state = self.shared.state.lock();
            for entry in state.queue.drain() {
                entry.job.resolve_canceled();
            }
            for entry in state.deferred.drain(..) {
                entry.job.resolve_canceled();
            }
            state.jobs.clear();
        }
        self.shared.bump();
        self.shared.work_available.notify_waiters();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
        info!("tile scheduler stopped");
    }

    async fn worker(shared: Arc<Shared>, index: usize) {
        debug!(worker = index, "worker started");
        loop {
            match Self::next_job(&shared) {
                Some(queued) => Self::execute(&shared, queued).await,
                None => {
                    tokio::select! {
                        biased;
                        _ = shared.shutdown.cancelled() => break,
                        _ = shared.work_available.notified() => {}
                    }
                }
            }
        }
        debug!(worker = index, "worker stopped");
    }

    /// Pops the next runnable job, resolving canceled entries and deferring
    /// entries whose key is already in flight.
    fn next_job(shared: &Shared) -> Option<QueuedJob> {
        let mut state = shared.state.lock();
        while let Some(entry) = state.queue.pop() {
            if entry.job.cancel_token().is_cancelled() {
                debug!(job = %entry.job.id(), "queued job canceled before running");
                entry.job.resolve_canceled();
                Shared::detach(&mut state, &entry.job);
                shared.bump();
                continue;
            }
            if state.in_flight.contains(entry.job.id()) {
                state.deferred.push(entry);
                continue;
            }
            state.in_flight.insert(entry.job.id().clone());
            return Some(entry);
        }
        None
    }

    async fn execute(shared: &Shared, entry: QueuedJob) {
        let job = entry.job;
        job.set_running();
        shared.bump();
        debug!(job = %job.id(), priority = %entry.priority, "job started");

        let outcome = shared
            .fetcher
            .fetch(job.layer(), job.tile(), job.cancel_token())
            .await;
        match &outcome {
            Ok(bytes) => debug!(job = %job.id(), bytes = bytes.len(), "job done"),
            Err(e) if e.is_canceled() => debug!(job = %job.id(), "job canceled"),
            Err(e) => warn!(job = %job.id(), error = %e, "job failed"),
        }
        job.resolve(outcome);

        let requeued = {
            let mut state = shared.state.lock();
            state.in_flight.remove(job.id());
            Shared::detach(&mut state, &job);

            // The key just freed up; any deferred entry for it can run.
            let mut requeued = 0;
            let mut i = 0;
            while i < state.deferred.len() {
                if state.in_flight.contains(state.deferred[i].job.id()) {
                    i += 1;
                } else {
                    let deferred = state.deferred.swap_remove(i);
                    state.queue.push_back(deferred);
                    requeued += 1;
                }
            }
            requeued
        };
        for _ in 0..requeued {
            shared.work_available.notify_one();
        }
        shared.bump();
    }
}

impl Drop for TileScheduler {
    fn drop(&mut self) {
        // Dropping without shutdown() must still resolve outstanding
        // handles; an unresolved job would leave its waiters hanging on a
        // watch channel that never reaches a terminal state.
        self.shared.shutdown.cancel();
        let jobs: Vec<Arc<JobInner>> = {
            let mut state = self.shared.state.lock();
            let jobs = state.jobs.values().cloned().collect();
            for entry in state.queue.drain() {
                entry.job.resolve_canceled();
            }
            for entry in state.deferred.drain(..) {
                entry.job.resolve_canceled();
            }
            state.jobs.clear();
            jobs
        };
        // Running jobs are resolved by their worker at the next
        // cancellation checkpoint.
        for job in jobs {
            job.cancel_token().cancel();
        }
        self.shared.bump();
        self.shared.work_available.notify_waiters();
    }
}
