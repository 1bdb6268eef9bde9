//! In-memory queue state shared by every store implementation.

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::ClaimRequest;
use apisync_protocol::{ItemId, ItemOp, NewItem, QueueItem};
use std::collections::BTreeMap;

/// What happened to a failed item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Failed {
    /// Released with backoff.
    Retry(QueueItem),
    /// Removed at the ceiling.
    Dropped(QueueItem),
}

/// Items keyed by id. Ids are handed out in increasing order, so key order
/// is creation order.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueueState {
    items: BTreeMap<ItemId, QueueItem>,
    next_id: u64,
}

impl QueueState {
    fn allocate(&mut self) -> ItemId {
        self.next_id = self.next_id.max(1);
        let id = ItemId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, item: NewItem, now: u64) -> QueueItem {
        let id = self.allocate();
        let stored = QueueItem::from_new(id, item, now);
        self.items.insert(id, stored.clone());
        stored
    }

    /// Returns the stored item and whether it was newly created.
    pub(crate) fn merge(&mut self, item: NewItem, now: u64) -> (QueueItem, bool) {
        let ItemOp::Push(new_op) = item.op else {
            return (self.insert(item, now), true);
        };
        let Some(entity_id) = item.entity_id else {
            return (self.insert(item, now), true);
        };

        let pending = self.items.values_mut().find(|existing| {
            existing.name == item.name
                && existing.entity_id == Some(entity_id)
                && existing.expire <= now
                && existing.push_op().is_some()
        });

        match pending {
            Some(existing) => {
                if let ItemOp::Push(old_op) = existing.op {
                    existing.op = ItemOp::Push(old_op.merge(new_op));
                }
                if item.mapped_object_id.is_some() {
                    existing.mapped_object_id = item.mapped_object_id;
                }
                existing.failures = 0;
                existing.expire = 0;
                existing.updated = now;
                (existing.clone(), false)
            }
            None => (self.insert(item, now), true),
        }
    }

    pub(crate) fn claim(&mut self, request: &ClaimRequest, now: u64) -> Vec<QueueItem> {
        let expire = now.saturating_add(request.lease_secs());

        self.items
            .values_mut()
            .filter(|item| request.matches(item, now))
            .take(request.limit)
            .map(|item| {
                item.expire = expire;
                item.clone()
            })
            .collect()
    }

    pub(crate) fn delete(&mut self, id: ItemId) -> Option<QueueItem> {
        self.items.remove(&id)
    }

    pub(crate) fn release(&mut self, id: ItemId, now: u64) -> QueueResult<QueueItem> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(QueueError::ItemNotFound(id))?;
        item.expire = 0;
        item.updated = now;
        Ok(item.clone())
    }

    pub(crate) fn fail(&mut self, id: ItemId, now: u64, config: &QueueConfig) -> QueueResult<Failed> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(QueueError::ItemNotFound(id))?;

        item.failures = item.failures.saturating_add(1);
        item.updated = now;

        if item.failures >= config.ceiling() {
            let removed = self.items.remove(&id).ok_or(QueueError::ItemNotFound(id))?;
            return Ok(Failed::Dropped(removed));
        }

        let delay = config.backoff.delay_for_failure(item.failures);
        let delay_secs = delay.as_secs() + u64::from(delay.subsec_nanos() > 0);
        item.expire = if delay_secs == 0 {
            0
        } else {
            now.saturating_add(delay_secs)
        };
        Ok(Failed::Retry(item.clone()))
    }

    pub(crate) fn exhausted(&self, config: &QueueConfig) -> Vec<ItemId> {
        self.items
            .values()
            .filter(|item| item.failures >= config.ceiling())
            .map(|item| item.id)
            .collect()
    }

    pub(crate) fn get(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.get(&id)
    }

    pub(crate) fn items(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Replays a stored item.
    pub(crate) fn put(&mut self, item: QueueItem) {
        self.next_id = self.next_id.max(item.id.0 + 1);
        self.items.insert(item.id, item);
    }
}
