//! The queue store contract.

use crate::error::QueueResult;
use apisync_protocol::{ItemId, MappingId, NewItem, QueueItem};
use std::collections::BTreeSet;
use std::time::Duration;

/// Parameters for a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    /// How long the claimed items stay invisible to other claimants.
    pub lease: Duration,
    /// Maximum number of items to claim.
    pub limit: usize,
    /// Only claim items for this mapping.
    pub mapping: Option<MappingId>,
    /// Never claim these items.
    pub exclude: BTreeSet<ItemId>,
}

impl ClaimRequest {
    /// Claims a single item of any mapping.
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            limit: 1,
            mapping: None,
            exclude: BTreeSet::new(),
        }
    }

    /// Sets the maximum number of items.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Restricts the claim to one mapping.
    pub fn for_mapping(mut self, mapping: MappingId) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Skips the given items.
    pub fn excluding(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    /// Lease length in whole seconds, never below one.
    pub fn lease_secs(&self) -> u64 {
        let secs = self.lease.as_secs() + u64::from(self.lease.subsec_nanos() > 0);
        secs.max(1)
    }

    /// Returns true if `item` is a candidate at `now`.
    pub fn matches(&self, item: &QueueItem, now: u64) -> bool {
        item.is_available(now)
            && !self.exclude.contains(&item.id)
            && self.mapping.as_ref().map_or(true, |m| *m == item.name)
    }
}

/// Result of a failure that did not reach the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailOutcome {
    /// Failure count after this failure.
    pub failures: u32,
    /// Unix time at which the item becomes claimable again.
    pub available_at: u64,
}

/// Durable, ordered storage of queue items.
///
/// Implementations must make [`QueueStore::claim`] atomic with respect to
/// every other claimant of the same underlying store, including claimants in
/// other processes when the store is shared through the filesystem.
///
/// # Implementors
///
/// - [`crate::MemoryQueue`] - in-process, for tests and single-process use
/// - [`crate::JournalQueue`] - file-backed, shared between processes
pub trait QueueStore: Send + Sync {
    /// Stores a new item and returns its id.
    fn create_item(&self, item: NewItem) -> QueueResult<ItemId>;

    /// Stores a push item, folding it into an unleased pending item for the
    /// same mapping and entity when one exists.
    ///
    /// Items without an entity id are always created.
    fn merge_item(&self, item: NewItem) -> QueueResult<ItemId>;

    /// Claims up to `request.limit` available items, oldest first.
    fn claim(&self, request: &ClaimRequest) -> QueueResult<Vec<QueueItem>>;

    /// Claims the oldest available item.
    fn claim_item(&self, lease: Duration) -> QueueResult<Option<QueueItem>> {
        Ok(self.claim(&ClaimRequest::new(lease))?.into_iter().next())
    }

    /// Removes an item. Removing a missing item is not an error.
    fn delete_item(&self, id: ItemId) -> QueueResult<()>;

    /// Clears the lease so the item can be claimed again right away.
    fn release_item(&self, id: ItemId) -> QueueResult<()>;

    /// Records a failure.
    ///
    /// Below the ceiling the item is released with backoff. At the ceiling
    /// the item is removed and [`crate::QueueError::FailureLimitReached`] is
    /// returned so the caller can surface it.
    fn fail_item(&self, id: ItemId, error: &str) -> QueueResult<FailOutcome>;

    /// Looks up an item without claiming it.
    fn get_item(&self, id: ItemId) -> QueueResult<Option<QueueItem>>;

    /// Every stored item, oldest first.
    fn items(&self) -> QueueResult<Vec<QueueItem>>;

    /// Number of stored items, leased or not.
    fn number_of_items(&self) -> QueueResult<usize>;

    /// Removes items whose failure count already reached the ceiling.
    fn garbage_collect(&self) -> QueueResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use apisync_protocol::PushOp;

    #[test]
    fn lease_rounds_up() {
        assert_eq!(ClaimRequest::new(Duration::ZERO).lease_secs(), 1);
        assert_eq!(ClaimRequest::new(Duration::from_millis(1500)).lease_secs(), 2);
        assert_eq!(ClaimRequest::new(Duration::from_secs(30)).lease_secs(), 30);
    }

    #[test]
    fn request_filters() {
        let item = QueueItem::from_new(ItemId(3), NewItem::push("m", 1u64, PushOp::Create), 10);

        let request = ClaimRequest::new(Duration::from_secs(5));
        assert!(request.matches(&item, 10));

        let other = request.clone().for_mapping(MappingId::from("other"));
        assert!(!other.matches(&item, 10));

        let skipping = request.excluding([ItemId(3)]);
        assert!(!skipping.matches(&item, 10));
    }
}
