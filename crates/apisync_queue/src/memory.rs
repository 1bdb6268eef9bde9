//! In-process queue store.

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::state::{Failed, QueueState};
use crate::store::{ClaimRequest, FailOutcome, QueueStore};
use apisync_protocol::{ItemId, NewItem, QueueItem};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// A queue store held entirely in memory.
///
/// All operations take one lock, which makes claims atomic between threads.
/// Contents are lost when the store is dropped; use
/// [`crate::JournalQueue`] when items must survive a restart.
///
/// # Example
///
/// ```rust
/// use apisync_protocol::{NewItem, PushOp};
/// use apisync_queue::{BackoffPolicy, MemoryQueue, QueueConfig, QueueStore};
/// use std::time::Duration;
///
/// let queue = MemoryQueue::new(QueueConfig::new(3, BackoffPolicy::none()));
/// let id = queue.create_item(NewItem::push("contact", 7u64, PushOp::Create)).unwrap();
/// let claimed = queue.claim_item(Duration::from_secs(30)).unwrap().unwrap();
/// assert_eq!(claimed.id, id);
/// queue.delete_item(id).unwrap();
/// ```
pub struct MemoryQueue {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    /// Creates an empty queue on the system clock.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty queue on the given clock.
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Returns the failure policy.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl QueueStore for MemoryQueue {
    fn create_item(&self, item: NewItem) -> QueueResult<ItemId> {
        let stored = self.state.lock().insert(item, self.clock.now());
        debug!(item_id = %stored.id, mapping = %stored.name, op = %stored.op, "queue item created");
        Ok(stored.id)
    }

    fn merge_item(&self, item: NewItem) -> QueueResult<ItemId> {
        let (stored, created) = self.state.lock().merge(item, self.clock.now());
        debug!(item_id = %stored.id, mapping = %stored.name, op = %stored.op, created, "queue item merged");
        Ok(stored.id)
    }

    fn claim(&self, request: &ClaimRequest) -> QueueResult<Vec<QueueItem>> {
        let claimed = self.state.lock().claim(request, self.clock.now());
        for item in &claimed {
            debug!(item_id = %item.id, mapping = %item.name, expire = item.expire, "queue item claimed");
        }
        Ok(claimed)
    }

    fn delete_item(&self, id: ItemId) -> QueueResult<()> {
        if self.state.lock().delete(id).is_none() {
            debug!(item_id = %id, "delete of missing queue item ignored");
        }
        Ok(())
    }

    fn release_item(&self, id: ItemId) -> QueueResult<()> {
        self.state.lock().release(id, self.clock.now())?;
        debug!(item_id = %id, "queue item released");
        Ok(())
    }

    fn fail_item(&self, id: ItemId, error: &str) -> QueueResult<FailOutcome> {
        let failed = self.state.lock().fail(id, self.clock.now(), &self.config)?;
        match failed {
            Failed::Retry(item) => {
                debug!(item_id = %id, failures = item.failures, expire = item.expire, error, "queue item failed, will retry");
                Ok(FailOutcome {
                    failures: item.failures,
                    available_at: item.expire,
                })
            }
            Failed::Dropped(item) => {
                warn!(item_id = %id, mapping = %item.name, failures = item.failures, error, "queue item dropped at failure ceiling");
                Err(QueueError::FailureLimitReached {
                    id,
                    failures: item.failures,
                    message: error.to_string(),
                })
            }
        }
    }

    fn get_item(&self, id: ItemId) -> QueueResult<Option<QueueItem>> {
        Ok(self.state.lock().get(id).cloned())
    }

    fn items(&self) -> QueueResult<Vec<QueueItem>> {
        Ok(self.state.lock().items().cloned().collect())
    }

    fn number_of_items(&self) -> QueueResult<usize> {
        Ok(self.state.lock().len())
    }

    fn garbage_collect(&self) -> QueueResult<usize> {
        let mut state = self.state.lock();
        let exhausted = state.exhausted(&self.config);
        for id in &exhausted {
            state.delete(*id);
        }
        if !exhausted.is_empty() {
            warn!(count = exhausted.len(), "removed queue items past failure ceiling");
        }
        Ok(exhausted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BackoffPolicy;
    use apisync_protocol::PushOp;
    use std::time::Duration;

    fn queue(max_failures: u32) -> (MemoryQueue, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = QueueConfig::new(max_failures, BackoffPolicy::fixed(Duration::from_secs(60)));
        (MemoryQueue::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn fifo_claim() {
        let (queue, _) = queue(3);
        let a = queue.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();
        let b = queue.create_item(NewItem::push("m", 2u64, PushOp::Create)).unwrap();

        let lease = Duration::from_secs(30);
        assert_eq!(queue.claim_item(lease).unwrap().unwrap().id, a);
        assert_eq!(queue.claim_item(lease).unwrap().unwrap().id, b);
        assert!(queue.claim_item(lease).unwrap().is_none());
    }

    #[test]
    fn expired_lease_is_reclaimable() {
        let (queue, clock) = queue(3);
        let id = queue.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();
        let lease = Duration::from_secs(30);

        queue.claim_item(lease).unwrap().unwrap();
        assert!(queue.claim_item(lease).unwrap().is_none());

        clock.advance(30);
        let reclaimed = queue.claim_item(lease).unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
    }

    #[test]
    fn release_makes_item_claimable() {
        let (queue, _) = queue(3);
        let id = queue.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();
        let lease = Duration::from_secs(300);

        queue.claim_item(lease).unwrap().unwrap();
        queue.release_item(id).unwrap();
        assert_eq!(queue.claim_item(lease).unwrap().unwrap().id, id);
    }

    #[test]
    fn fail_below_ceiling_keeps_item() {
        let (queue, clock) = queue(3);
        let id = queue.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();

        for expected in 1..3 {
            let outcome = queue.fail_item(id, "remote timeout").unwrap();
            assert_eq!(outcome.failures, expected);
            clock.advance(60);
        }

        let item = queue.claim_item(Duration::from_secs(30)).unwrap().unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.failures, 2);
    }

    #[test]
    fn fail_at_ceiling_removes_item() {
        let (queue, _) = queue(3);
        let id = queue.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();

        queue.fail_item(id, "e1").unwrap();
        queue.fail_item(id, "e2").unwrap();
        let err = queue.fail_item(id, "e3").unwrap_err();

        assert!(matches!(err, QueueError::FailureLimitReached { failures: 3, .. }));
        assert!(queue.get_item(id).unwrap().is_none());
        assert_eq!(queue.number_of_items().unwrap(), 0);
    }

    #[test]
    fn backoff_hides_failed_item() {
        let (queue, clock) = queue(5);
        let id = queue.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();
        let outcome = queue.fail_item(id, "busy").unwrap();
        assert_eq!(outcome.available_at, 1_060);

        assert!(queue.claim_item(Duration::from_secs(5)).unwrap().is_none());
        clock.advance(60);
        assert!(queue.claim_item(Duration::from_secs(5)).unwrap().is_some());
    }

    #[test]
    fn claim_batch_per_mapping() {
        let (queue, _) = queue(3);
        queue.create_item(NewItem::push("a", 1u64, PushOp::Create)).unwrap();
        queue.create_item(NewItem::push("b", 2u64, PushOp::Create)).unwrap();
        queue.create_item(NewItem::push("a", 3u64, PushOp::Create)).unwrap();

        let request = ClaimRequest::new(Duration::from_secs(30))
            .with_limit(10)
            .for_mapping("a".into());
        let claimed = queue.claim(&request).unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.iter().all(|item| item.name.as_str() == "a"));
    }

    #[test]
    fn garbage_collect_after_ceiling_drop() {
        let clock = Arc::new(ManualClock::new(0));
        let loose = MemoryQueue::with_clock(QueueConfig::new(10, BackoffPolicy::none()), clock.clone());
        let id = loose.create_item(NewItem::push("m", 1u64, PushOp::Create)).unwrap();
        loose.fail_item(id, "x").unwrap();
        loose.fail_item(id, "x").unwrap();

        // Same items, stricter policy.
        let strict = MemoryQueue::with_clock(QueueConfig::new(2, BackoffPolicy::none()), clock);
        for item in loose.items().unwrap() {
            strict.state.lock().put(item);
        }
        assert_eq!(strict.garbage_collect().unwrap(), 1);
        assert_eq!(strict.number_of_items().unwrap(), 0);
    }

    #[test]
    fn delete_missing_is_ok() {
        let (queue, _) = queue(3);
        assert!(queue.delete_item(ItemId(77)).is_ok());
        assert!(matches!(
            queue.release_item(ItemId(77)),
            Err(QueueError::ItemNotFound(_))
        ));
    }
}
