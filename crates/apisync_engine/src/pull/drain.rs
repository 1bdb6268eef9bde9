//! Drain-pass bookkeeping: deadlines, reports and claim guards.

use apisync_protocol::ItemId;
use apisync_queue::QueueStore;
use std::time::{Duration, Instant};
use tracing::warn;

/// When a drain pass stops claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainLimit {
    /// Run until the queue is empty.
    Unbounded,
    /// Stop claiming once this instant has passed.
    Until(Instant),
}

impl DrainLimit {
    /// A deadline `time_limit` from now, or unbounded for zero.
    pub fn from_time_limit(time_limit: Duration) -> Self {
        if time_limit.is_zero() {
            DrainLimit::Unbounded
        } else {
            DrainLimit::Until(Instant::now() + time_limit)
        }
    }

    /// Returns true once no further claims may be made.
    pub fn expired(&self) -> bool {
        match self {
            DrainLimit::Unbounded => false,
            DrainLimit::Until(deadline) => Instant::now() >= *deadline,
        }
    }
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items claimed and handled.
    pub count: usize,
    /// Items finished and deleted.
    pub done: usize,
    /// Items released for another attempt.
    pub requeued: usize,
    /// Items failed with backoff.
    pub failed: usize,
    /// Items removed at the failure ceiling.
    pub dropped: usize,
    /// Wall time of the pass.
    pub elapsed: Duration,
}

/// Releases a claimed item on drop unless it was acknowledged.
pub(crate) struct ClaimGuard<'a> {
    queue: &'a dyn QueueStore,
    id: Option<ItemId>,
}

impl<'a> ClaimGuard<'a> {
    pub(crate) fn new(queue: &'a dyn QueueStore, id: ItemId) -> Self {
        Self {
            queue,
            id: Some(id),
        }
    }

    /// The item has been deleted, released or failed explicitly.
    pub(crate) fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.queue.release_item(id) {
                warn!(item_id = %id, error = %e, "failed to release claimed pull item");
            }
        }
    }
}
