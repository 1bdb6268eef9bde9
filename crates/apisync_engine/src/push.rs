//! Push processing: local entity changes to remote records.

use crate::config::PushConfig;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::events::{NoticeLevel, SyncEvent};
use crate::hooks::PushVerdict;
use crate::resolver::MappedObjectResolver;
use apisync_protocol::{
    Entity, ItemId, MappedObject, Mapping, MappingId, NewItem, PushOp, QueueItem, SyncAction,
};
use apisync_queue::{ClaimRequest, QueueError, QueueStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one push item that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The remote record was created or updated.
    Pushed(MappedObject),
    /// The remote record and the mapped object were deleted.
    Deleted,
    /// Delete of something never synchronized. Nothing to do.
    AlreadySatisfied,
    /// A push guard vetoed the operation.
    Vetoed(String),
}

/// Counts from one push batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Items finished and removed from the queue.
    pub done: usize,
    /// Items released without a failure count.
    pub requeued: usize,
    /// Items that failed and will be retried.
    pub failed: usize,
    /// Items removed after a permanent failure.
    pub dropped: usize,
}

impl PushReport {
    /// Total items handled.
    pub fn total(&self) -> usize {
        self.done + self.requeued + self.failed + self.dropped
    }

    fn absorb(&mut self, other: PushReport) {
        self.done += other.done;
        self.requeued += other.requeued;
        self.failed += other.failed;
        self.dropped += other.dropped;
    }
}

/// Processes claimed push items against the remote.
pub struct PushProcessor {
    ctx: Arc<SyncContext>,
    queue: Arc<dyn QueueStore>,
}

impl PushProcessor {
    /// Creates a processor acknowledging items on `queue`.
    pub fn new(ctx: Arc<SyncContext>, queue: Arc<dyn QueueStore>) -> Self {
        Self { ctx, queue }
    }

    /// Processes a batch of claimed items.
    ///
    /// Without a token nothing is consumed and `AuthUnavailable` is returned;
    /// the caller still holds every claim. Otherwise each item is deleted,
    /// released or failed on its own. A suspend raised mid-batch releases the
    /// current and remaining items before returning the error.
    pub fn process(&self, items: &[QueueItem]) -> SyncResult<PushReport> {
        self.ctx.require_token()?;

        let mut report = PushReport::default();
        for (index, item) in items.iter().enumerate() {
            match self.push_item(item) {
                Ok(outcome) => {
                    if let PushOutcome::Vetoed(reason) = &outcome {
                        info!(item_id = %item.id, mapping = %item.name, reason = %reason, "push vetoed");
                        self.ctx.notify(SyncEvent::notice(
                            NoticeLevel::Notice,
                            format!("push of item {} for {} vetoed: {reason}", item.id, item.name),
                        ));
                    }
                    self.queue.delete_item(item.id)?;
                    report.done += 1;
                }
                Err(e) if e.is_suspend() => {
                    warn!(item_id = %item.id, error = %e, "push batch suspended");
                    self.release_all(&items[index..]);
                    return Err(e);
                }
                Err(e) if e.is_requeue() => {
                    debug!(item_id = %item.id, error = %e, "push item requeued");
                    self.queue.release_item(item.id)?;
                    report.requeued += 1;
                }
                Err(e) if !e.is_retryable() => {
                    error!(item_id = %item.id, mapping = %item.name, op = %item.op, error = %e, "push item failed permanently");
                    self.queue.delete_item(item.id)?;
                    report.dropped += 1;
                }
                Err(e) => match self.queue.fail_item(item.id, &e.to_string()) {
                    Ok(outcome) => {
                        debug!(item_id = %item.id, failures = outcome.failures, "push item will retry");
                        report.failed += 1;
                    }
                    Err(q) if q.is_permanent_failure() => {
                        error!(item_id = %item.id, mapping = %item.name, op = %item.op, error = %q, "push item dropped");
                        self.ctx
                            .notify(SyncEvent::notice(NoticeLevel::Error, q.to_string()));
                        report.dropped += 1;
                    }
                    Err(q) => return Err(q.into()),
                },
            }
        }
        Ok(report)
    }

    /// Processes one item without touching the queue.
    ///
    /// Failures are returned to the caller, who applies the queue's failure
    /// policy.
    pub fn process_item(&self, item: &QueueItem) -> SyncResult<PushOutcome> {
        self.ctx.require_token()?;
        self.push_item(item)
    }

    fn push_item(&self, item: &QueueItem) -> SyncResult<PushOutcome> {
        let mapping = self.ctx.mapping(&item.name)?;
        let op = item.push_op().ok_or_else(|| {
            SyncError::InvalidRequest(format!("item {} is not a push item", item.id))
        })?;

        let mut object =
            MappedObjectResolver::new(self.ctx.mapped_objects.as_ref()).resolve(item, mapping)?;

        if object.is_new() && op == PushOp::Delete {
            debug!(item_id = %item.id, mapping = %mapping.id, "delete of unsynchronized entity, nothing to do");
            return Ok(PushOutcome::AlreadySatisfied);
        }

        self.ctx.notify(SyncEvent::PushBefore {
            mapping: mapping.id.clone(),
            item_id: item.id,
            op: item.op,
            entity_id: item.entity_id.or(object.entity_id),
        });

        if let PushVerdict::Veto(reason) = self.ctx.check_push_guards(mapping, item, &object) {
            return Ok(PushOutcome::Vetoed(reason));
        }

        let result = match op {
            PushOp::Delete => self.push_delete(mapping, &object),
            PushOp::Create | PushOp::Update => self.push_upsert(mapping, item, &mut object),
        };

        match &result {
            Ok(_) => self.ctx.notify(SyncEvent::Success {
                mapping: mapping.id.clone(),
                item_id: item.id,
                op: item.op,
                remote_id: object.remote_id.clone(),
            }),
            Err(e) => {
                self.ctx.notify(SyncEvent::Failure {
                    mapping: mapping.id.clone(),
                    item_id: item.id,
                    op: item.op,
                    message: e.to_string(),
                });
                if !object.is_new() {
                    let action = action_for(op, &object);
                    self.save_failure(&mut object, action, e);
                }
            }
        }

        result
    }

    fn push_delete(&self, mapping: &Mapping, object: &MappedObject) -> SyncResult<PushOutcome> {
        if let Some(remote_id) = &object.remote_id {
            self.ctx.remote.delete(&mapping.remote_object_type, remote_id)?;
        }
        if let Some(id) = object.id {
            self.ctx.mapped_objects.delete(id)?;
        }
        Ok(PushOutcome::Deleted)
    }

    fn push_upsert(
        &self,
        mapping: &Mapping,
        item: &QueueItem,
        object: &mut MappedObject,
    ) -> SyncResult<PushOutcome> {
        let entity_id = item.entity_id.or(object.entity_id).ok_or_else(|| {
            SyncError::InvalidRequest(format!("item {} has no local entity", item.id))
        })?;

        let entity = self
            .ctx
            .entities
            .load(&mapping.entity_type, entity_id)?
            .ok_or_else(|| SyncError::EntityNotFound {
                entity_type: mapping.entity_type.clone(),
                entity_id,
            })?;
        object.entity_id = Some(entity_id);

        let values = mapping.push_values(&entity);
        let action = match &object.remote_id {
            Some(remote_id) => {
                self.ctx
                    .remote
                    .update(&mapping.remote_object_type, remote_id, &values)?;
                SyncAction::PushUpdate
            }
            None => {
                let remote_id = self.ctx.remote.create(&mapping.remote_object_type, &values)?;
                object.remote_id = Some(remote_id);
                SyncAction::PushCreate
            }
        };

        let now = self.ctx.now();
        object.record_success(action, now, format!("{} pushed", describe(&entity)));
        object.changed = now;
        self.ctx.mapped_objects.save(object)?;
        Ok(PushOutcome::Pushed(object.clone()))
    }

    fn save_failure(&self, object: &mut MappedObject, action: SyncAction, error: &SyncError) {
        object.record_failure(action, error.to_string());
        object.changed = self.ctx.now();
        if let Err(e) = self.ctx.mapped_objects.save(object) {
            warn!(mapped_object_id = ?object.id, error = %e, "failed to record sync failure");
        }
    }

    fn release_all(&self, items: &[QueueItem]) {
        for item in items {
            match self.queue.release_item(item.id) {
                Ok(()) | Err(QueueError::ItemNotFound(_)) => {}
                Err(e) => warn!(item_id = %item.id, error = %e, "failed to release push item"),
            }
        }
    }
}

fn action_for(op: PushOp, object: &MappedObject) -> SyncAction {
    match op {
        PushOp::Delete => SyncAction::PushDelete,
        _ if object.remote_id.is_some() => SyncAction::PushUpdate,
        _ => SyncAction::PushCreate,
    }
}

fn describe(entity: &Entity) -> String {
    match entity.id {
        Some(id) => format!("{} {id}", entity.entity_type),
        None => entity.entity_type.clone(),
    }
}

/// Push queue runner: enqueues entity changes and drains them per mapping.
pub struct PushQueue {
    ctx: Arc<SyncContext>,
    queue: Arc<dyn QueueStore>,
    config: PushConfig,
    processor: PushProcessor,
}

impl PushQueue {
    /// Creates a runner over `queue`.
    pub fn new(ctx: Arc<SyncContext>, queue: Arc<dyn QueueStore>, config: PushConfig) -> Self {
        let processor = PushProcessor::new(Arc::clone(&ctx), Arc::clone(&queue));
        Self {
            ctx,
            queue,
            config,
            processor,
        }
    }

    /// The processor used for batches.
    pub fn processor(&self) -> &PushProcessor {
        &self.processor
    }

    /// The underlying queue.
    pub fn queue(&self) -> &Arc<dyn QueueStore> {
        &self.queue
    }

    /// Enqueues push work for every mapping of `entity` whose trigger for
    /// `op` is on. Pending items for the same entity are coalesced.
    pub fn enqueue_entity_change(&self, entity: &Entity, op: PushOp) -> SyncResult<Vec<ItemId>> {
        let entity_id = entity.id.ok_or_else(|| {
            SyncError::InvalidRequest(format!("unsaved {} cannot be pushed", entity.entity_type))
        })?;

        let mut ids = Vec::new();
        for mapping in self.ctx.mappings.for_entity(entity) {
            if !mapping.triggers.pushes(op) {
                continue;
            }

            let mut item = NewItem::push(mapping.id.clone(), entity_id, op);
            if let Some(object) = self.ctx.mapped_objects.find_by_entity(&mapping.id, entity_id)? {
                if let Some(id) = object.id {
                    item = item.with_mapped_object(id);
                }
            }

            let id = self.queue.merge_item(item)?;
            debug!(item_id = %id, mapping = %mapping.id, entity_id = %entity_id, op = ?op, "push enqueued");
            ids.push(id);
        }
        Ok(ids)
    }

    /// Runs one pass over every mapping.
    ///
    /// Each mapping gets a batch of at most its push limit (or the default),
    /// and the pass stops once the global limit is spent. An auth failure
    /// releases the claimed batch and ends the pass with the error.
    pub fn process_queues(&self) -> SyncResult<PushReport> {
        let mut remaining = self.config.global_limit as usize;
        let mut report = PushReport::default();

        for mapping in self.ctx.mappings.iter() {
            if remaining == 0 {
                debug!("global push limit reached");
                break;
            }
            let handled = self.process_mapping_batch(mapping, remaining)?;
            remaining = remaining.saturating_sub(handled.total());
            report.absorb(handled);
        }

        if report.total() > 0 {
            info!(done = report.done, failed = report.failed, dropped = report.dropped, requeued = report.requeued, "push pass finished");
        }
        Ok(report)
    }

    /// Runs one batch for a single mapping.
    pub fn process_mapping(&self, mapping: &MappingId) -> SyncResult<PushReport> {
        let mapping = self.ctx.mapping(mapping)?;
        self.process_mapping_batch(mapping, self.config.global_limit as usize)
    }

    /// Removes items past the failure ceiling.
    pub fn garbage_collect(&self) -> SyncResult<usize> {
        Ok(self.queue.garbage_collect()?)
    }

    fn process_mapping_batch(&self, mapping: &Mapping, cap: usize) -> SyncResult<PushReport> {
        let limit = match mapping.push_limit {
            0 => self.config.default_mapping_limit,
            limit => limit,
        };
        let limit = (limit as usize).min(cap);
        if limit == 0 {
            return Ok(PushReport::default());
        }

        let request = ClaimRequest::new(self.config.lease)
            .with_limit(limit)
            .for_mapping(mapping.id.clone());
        let batch = self.queue.claim(&request)?;
        if batch.is_empty() {
            return Ok(PushReport::default());
        }

        debug!(mapping = %mapping.id, count = batch.len(), "push batch claimed");
        match self.processor.process(&batch) {
            Err(SyncError::AuthUnavailable) => {
                // Nothing was consumed; hand the whole batch back.
                self.processor.release_all(&batch);
                Err(SyncError::AuthUnavailable)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::MappingRegistry;
    use crate::storage::MappedObjectStore;
    use crate::memory::{MemoryEntityStorage, MemoryMappedObjects, MockRemote, StaticTokenProvider};
    use apisync_protocol::{Direction, EntityId, SyncTriggers};
    use apisync_queue::{BackoffPolicy, MemoryQueue, QueueConfig};
    use std::time::Duration;

    struct Fixture {
        entities: Arc<MemoryEntityStorage>,
        objects: Arc<MemoryMappedObjects>,
        remote: Arc<MockRemote>,
        tokens: Arc<StaticTokenProvider>,
        queue: Arc<MemoryQueue>,
        runner: PushQueue,
    }

    fn fixture(mappings: Vec<Mapping>) -> Fixture {
        let entities = Arc::new(MemoryEntityStorage::new());
        let objects = Arc::new(MemoryMappedObjects::new());
        let remote = Arc::new(MockRemote::new());
        let tokens = Arc::new(StaticTokenProvider::new("t"));
        let queue = Arc::new(MemoryQueue::new(QueueConfig::new(3, BackoffPolicy::none())));
        let ctx = Arc::new(SyncContext::new(
            MappingRegistry::new(mappings),
            entities.clone(),
            objects.clone(),
            remote.clone(),
            tokens.clone(),
        ));
        let runner = PushQueue::new(ctx, queue.clone(), PushConfig::new());
        Fixture {
            entities,
            objects,
            remote,
            tokens,
            queue,
            runner,
        }
    }

    fn article() -> Mapping {
        Mapping::new("article", "node", "article", "Article__c")
            .with_field("title", "Name", Direction::Sync)
    }

    fn entity(id: u64) -> Entity {
        Entity::new("node", "article")
            .with_id(id)
            .with_field("title", format!("Title {id}"))
    }

    fn claim_all(queue: &MemoryQueue) -> Vec<QueueItem> {
        queue
            .claim(&ClaimRequest::new(Duration::from_secs(60)).with_limit(100))
            .unwrap()
    }

    #[test]
    fn enqueue_respects_triggers() {
        let no_delete = SyncTriggers {
            push_delete: false,
            ..SyncTriggers::all()
        };
        let f = fixture(vec![
            article(),
            Mapping::new("quiet", "node", "article", "Other__c").with_triggers(no_delete),
            Mapping::new("users", "user", "user", "Contact"),
        ]);

        let ids = f.runner.enqueue_entity_change(&entity(1), PushOp::Update).unwrap();
        assert_eq!(ids.len(), 2);

        let ids = f.runner.enqueue_entity_change(&entity(1), PushOp::Delete).unwrap();
        assert_eq!(ids.len(), 1);
        // Delete folded into the pending update.
        assert_eq!(f.queue.number_of_items().unwrap(), 2);
    }

    #[test]
    fn unsaved_entity_is_rejected() {
        let f = fixture(vec![article()]);
        let result = f
            .runner
            .enqueue_entity_change(&Entity::new("node", "article"), PushOp::Create);
        assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
    }

    #[test]
    fn create_then_update_reuses_remote_record() {
        let f = fixture(vec![article()]);
        f.entities.insert(entity(7), 7);

        f.runner.enqueue_entity_change(&entity(7), PushOp::Create).unwrap();
        let report = f.runner.process_queues().unwrap();
        assert_eq!(report.done, 1);

        f.runner.enqueue_entity_change(&entity(7), PushOp::Update).unwrap();
        f.runner.process_queues().unwrap();

        let calls = f.remote.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], crate::memory::RemoteCall::Create { .. }));
        assert!(matches!(calls[1], crate::memory::RemoteCall::Update { .. }));

        let objects = f.objects.all();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].last_sync_action, Some(SyncAction::PushUpdate));
        assert!(objects[0].last_sync_status);
    }

    #[test]
    fn missing_mapping_drops_item() {
        let f = fixture(vec![article()]);
        f.queue
            .create_item(NewItem::push("gone", 1u64, PushOp::Update))
            .unwrap();

        let report = f.runner.processor().process(&claim_all(&f.queue)).unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(f.queue.number_of_items().unwrap(), 0);
    }

    #[test]
    fn remote_failure_records_snapshot_on_existing_object() {
        let f = fixture(vec![article()]);
        f.entities.insert(entity(3), 3);
        let mut object = MappedObject::new("article".into(), "node")
            .with_entity(EntityId(3))
            .with_remote("R-3".into());
        f.objects.save(&mut object).unwrap();

        f.remote.fail_next(SyncError::remote_retryable("timeout"));
        let id = f
            .queue
            .create_item(NewItem::push("article", 3u64, PushOp::Update))
            .unwrap();

        let report = f.runner.processor().process(&claim_all(&f.queue)).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(f.queue.get_item(id).unwrap().unwrap().failures, 1);

        let saved = f.objects.all().remove(0);
        assert!(!saved.last_sync_status);
        assert_eq!(saved.last_sync_action, Some(SyncAction::PushUpdate));
        assert!(saved.last_sync_message.unwrap().contains("timeout"));
    }

    #[test]
    fn missing_token_consumes_nothing() {
        let f = fixture(vec![article()]);
        f.entities.insert(entity(1), 1);
        f.runner.enqueue_entity_change(&entity(1), PushOp::Create).unwrap();
        f.tokens.set(None);

        let result = f.runner.process_queues();
        assert!(matches!(result, Err(SyncError::AuthUnavailable)));
        assert!(f.remote.calls().is_empty());

        // Released, so immediately claimable again.
        let item = f.queue.items().unwrap().remove(0);
        assert_eq!(item.expire, 0);
        assert_eq!(item.failures, 0);
    }

    #[test]
    fn mapping_limits_bound_the_pass() {
        let f = fixture(vec![article().with_push_limit(2)]);
        for id in 1..=5u64 {
            f.entities.insert(entity(id), id);
            f.runner.enqueue_entity_change(&entity(id), PushOp::Create).unwrap();
        }

        let report = f.runner.process_queues().unwrap();
        assert_eq!(report.done, 2);
        assert_eq!(f.queue.number_of_items().unwrap(), 3);
    }

    #[test]
    fn veto_deletes_item_without_remote_call() {
        struct Never;
        impl crate::hooks::PushGuard for Never {
            fn check(&self, _: &Mapping, _: &QueueItem, _: &MappedObject) -> PushVerdict {
                PushVerdict::Veto("frozen".into())
            }
        }

        let entities = Arc::new(MemoryEntityStorage::new());
        entities.insert(entity(1), 1);
        let remote = Arc::new(MockRemote::new());
        let queue = Arc::new(MemoryQueue::new(QueueConfig::new(3, BackoffPolicy::none())));
        let ctx = SyncContext::new(
            MappingRegistry::new(vec![article()]),
            entities,
            Arc::new(MemoryMappedObjects::new()),
            remote.clone(),
            Arc::new(StaticTokenProvider::new("t")),
        )
        .with_push_guard(Arc::new(Never));
        let runner = PushQueue::new(Arc::new(ctx), queue.clone(), PushConfig::new());

        runner.enqueue_entity_change(&entity(1), PushOp::Create).unwrap();
        let report = runner.process_queues().unwrap();
        assert_eq!(report.done, 1);
        assert!(remote.calls().is_empty());
        assert_eq!(queue.number_of_items().unwrap(), 0);
    }
}
