//! Priority queue for tile jobs.
//!
//! Jobs are ordered by priority (higher values first), then by submit order
//! (FIFO within the same priority level). This ensures:
//!
//! 1. On-demand requests preempt prefetch work
//! 2. Jobs at the same priority run in submission order

use super::job::JobInner;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Job scheduling priority (higher = more important).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Requests a caller is actively waiting on.
    pub const ON_DEMAND: Priority = Priority(100);

    /// Background prefetch work.
    ///
    /// The default priority for submitted jobs.
    pub const PREFETCH: Priority = Priority(0);

    /// Creates a priority with the given value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the numeric priority value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::PREFETCH
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job waiting to be executed.
pub(super) struct QueuedJob {
    pub job: Arc<JobInner>,
    pub priority: Priority,
    sequence: u64,
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.job.id())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

// Ordering for BinaryHeap: higher priority first, then lower sequence
// (older) first.
impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // Reverse sequence ordering: older submissions come first.
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

/// Priority queue for tile jobs.
///
/// Not thread-safe; the scheduler wraps it in its state mutex. The sequence
/// counter lives here so FIFO order within a priority is a property of the
/// queue, not of global process state.
pub(super) struct PriorityQueue {
    heap: BinaryHeap<QueuedJob>,
    next_sequence: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Enqueues a job, assigning it the next sequence number.
    pub fn push(&mut self, job: Arc<JobInner>, priority: Priority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedJob {
            job,
            priority,
            sequence,
        });
    }

    /// Re-enqueues a previously popped job, keeping its original sequence so
    /// a deferred job does not lose its place within its priority level.
    pub fn push_back(&mut self, job: QueuedJob) {
        self.heap.push(job);
    }

    /// Removes and returns the highest-priority job.
    pub fn pop(&mut self) -> Option<QueuedJob> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes and returns every queued job.
    pub fn drain(&mut self) -> Vec<QueuedJob> {
        self.heap.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Layer;
    use crate::key::{LayerKey, TileKey};
    use crate::source::tests::MockSource;
    use std::time::Duration;

    fn job(name: &str, row: u32) -> Arc<JobInner> {
        let layer = Arc::new(Layer::new(
            LayerKey::from_parts(name, 1),
            Arc::new(MockSource::new("https://example.com/t")),
            Duration::from_secs(5),
        ));
        let tile = TileKey::from_grid(3, row, 0, 256, 256).unwrap();
        Arc::new(JobInner::new(layer, tile))
    }

    fn pop_name(queue: &mut PriorityQueue) -> String {
        queue.pop().unwrap().job.layer().key().name().to_string()
    }

    #[test]
    fn test_priority_ordering() {
        let mut queue = PriorityQueue::new();
        queue.push(job("prefetch", 0), Priority::PREFETCH);
        queue.push(job("on_demand", 1), Priority::ON_DEMAND);

        assert_eq!(pop_name(&mut queue), "on_demand");
        assert_eq!(pop_name(&mut queue), "prefetch");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = PriorityQueue::new();
        queue.push(job("first", 0), Priority::PREFETCH);
        queue.push(job("second", 1), Priority::PREFETCH);
        queue.push(job("third", 2), Priority::PREFETCH);

        assert_eq!(pop_name(&mut queue), "first");
        assert_eq!(pop_name(&mut queue), "second");
        assert_eq!(pop_name(&mut queue), "third");
    }

    #[test]
    fn test_mixed_priority_and_fifo() {
        let mut queue = PriorityQueue::new();
        queue.push(job("prefetch1", 0), Priority::PREFETCH);
        queue.push(job("on_demand1", 1), Priority::ON_DEMAND);
        queue.push(job("prefetch2", 2), Priority::PREFETCH);
        queue.push(job("on_demand2", 3), Priority::ON_DEMAND);

        assert_eq!(pop_name(&mut queue), "on_demand1");
        assert_eq!(pop_name(&mut queue), "on_demand2");
        assert_eq!(pop_name(&mut queue), "prefetch1");
        assert_eq!(pop_name(&mut queue), "prefetch2");
    }

    #[test]
    fn test_push_back_keeps_sequence() {
        let mut queue = PriorityQueue::new();
        queue.push(job("first", 0), Priority::PREFETCH);
        queue.push(job("second", 1), Priority::PREFETCH);

        // Pop and defer the head, then put it back; it is still the head.
        let deferred = queue.pop().unwrap();
        queue.push_back(deferred);
        assert_eq!(pop_name(&mut queue), "first");
        assert_eq!(pop_name(&mut queue), "second");
    }

    #[test]
    fn test_custom_priority_between_levels() {
        let mut queue = PriorityQueue::new();
        queue.push(job("prefetch", 0), Priority::PREFETCH);
        queue.push(job("custom", 1), Priority::new(50));
        queue.push(job("on_demand", 2), Priority::ON_DEMAND);

        assert_eq!(pop_name(&mut queue), "on_demand");
        assert_eq!(pop_name(&mut queue), "custom");
        assert_eq!(pop_name(&mut queue), "prefetch");
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = PriorityQueue::new();
        queue.push(job("a", 0), Priority::PREFETCH);
        queue.push(job("b", 1), Priority::PREFETCH);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
