//! End-to-end tests for push and pull processing.

use apisync_engine::{
    DrainLimit, EventBus, MappedObjectStore, MappingRegistry, MemoryEntityStorage,
    MemoryMappedObjects, MockRemote, PullConfig, PullQueue, PushConfig, PushOutcome, PushQueue,
    RecordingSink, RemoteCall, StaticTokenProvider, SyncContext, SyncError, SyncEvent,
};
use apisync_protocol::{
    Direction, Entity, EntityId, MappedObject, MappedObjectId, Mapping, NewItem, PushOp,
    QueueItem, RemoteId, RemoteRecord,
};
use apisync_queue::{BackoffPolicy, ClaimRequest, ManualClock, MemoryQueue, QueueConfig, QueueStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const LEASE: Duration = Duration::from_secs(60);

struct Harness {
    entities: Arc<MemoryEntityStorage>,
    objects: Arc<MemoryMappedObjects>,
    remote: Arc<MockRemote>,
    tokens: Arc<StaticTokenProvider>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
    ctx: Arc<SyncContext>,
}

impl Harness {
    fn new(mappings: Vec<Mapping>) -> Self {
        let entities = Arc::new(MemoryEntityStorage::new());
        let objects = Arc::new(MemoryMappedObjects::new());
        let remote = Arc::new(MockRemote::new());
        let tokens = Arc::new(StaticTokenProvider::new("token"));
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(10_000));

        let events = Arc::new(EventBus::with_tracing());
        events.subscribe(sink.clone());

        let ctx = Arc::new(
            SyncContext::new(
                MappingRegistry::new(mappings),
                entities.clone(),
                objects.clone(),
                remote.clone(),
                tokens.clone(),
            )
            .with_events(events)
            .with_clock(clock.clone()),
        );

        Self {
            entities,
            objects,
            remote,
            tokens,
            sink,
            clock,
            ctx,
        }
    }

    fn queue(&self, max_failures: u32) -> Arc<MemoryQueue> {
        Arc::new(MemoryQueue::with_clock(
            QueueConfig::new(max_failures, BackoffPolicy::none()),
            self.clock.clone(),
        ))
    }

    fn push(&self, queue: &Arc<MemoryQueue>) -> PushQueue {
        PushQueue::new(self.ctx.clone(), queue.clone(), PushConfig::new())
    }

    fn pull(&self, queue: &Arc<MemoryQueue>, config: PullConfig) -> PullQueue {
        PullQueue::new(self.ctx.clone(), queue.clone(), config)
    }
}

fn mapping_m() -> Mapping {
    Mapping::new("M", "node", "article", "Article__c")
        .with_field("title", "Name", Direction::Sync)
        .with_standalone(true, true)
}

fn article(id: u64) -> Entity {
    Entity::new("node", "article").with_field("title", format!("Article {id}"))
}

fn claim_all(queue: &MemoryQueue) -> Vec<QueueItem> {
    queue.claim(&ClaimRequest::new(LEASE).with_limit(100)).unwrap()
}

#[test]
fn push_create_end_to_end() {
    let h = Harness::new(vec![mapping_m()]);
    h.entities.insert(article(7), 7);
    let queue = h.queue(3);

    queue.create_item(NewItem::push("M", 7u64, PushOp::Create)).unwrap();
    let report = h.push(&queue).process_queues().unwrap();
    assert_eq!(report.done, 1);

    let calls = h.remote.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], RemoteCall::Create { object_type, .. } if object_type == "Article__c"));

    let objects = h.objects.all();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].entity_id, Some(EntityId(7)));
    assert_eq!(objects[0].remote_id, Some(RemoteId::from("R1")));
    assert!(objects[0].last_sync_status);

    assert_eq!(queue.number_of_items().unwrap(), 0);
    assert!(h.remote.record("R1").is_some());
}

#[test]
fn second_item_reuses_first_mapped_object() {
    let h = Harness::new(vec![mapping_m()]);
    h.entities.insert(article(7), 7);
    let queue = h.queue(3);

    let ghost = MappedObjectId(404);
    queue
        .create_item(NewItem::push("M", 7u64, PushOp::Create).with_mapped_object(ghost))
        .unwrap();
    queue
        .create_item(NewItem::push("M", 7u64, PushOp::Update).with_mapped_object(ghost))
        .unwrap();

    let push = h.push(&queue);
    let items = claim_all(&queue);
    assert_eq!(items.len(), 2);

    let first = match push.processor().process_item(&items[0]).unwrap() {
        PushOutcome::Pushed(object) => object,
        other => panic!("unexpected {other:?}"),
    };
    let second = match push.processor().process_item(&items[1]).unwrap() {
        PushOutcome::Pushed(object) => object,
        other => panic!("unexpected {other:?}"),
    };

    assert_eq!(first.id, second.id);
    assert_eq!(h.objects.len(), 1);

    let calls = h.remote.calls();
    assert!(matches!(calls[0], RemoteCall::Create { .. }));
    assert!(matches!(calls[1], RemoteCall::Update { .. }));
}

#[test]
fn delete_of_untracked_entity_skips_remote() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(3);
    queue.create_item(NewItem::push("M", 9u64, PushOp::Delete)).unwrap();

    let report = h.push(&queue).process_queues().unwrap();
    assert_eq!(report.done, 1);
    assert!(h.remote.calls().is_empty());
    assert_eq!(queue.number_of_items().unwrap(), 0);
}

#[test]
fn delete_of_tracked_entity_removes_both_sides() {
    let h = Harness::new(vec![mapping_m()]);
    h.entities.insert(article(7), 7);
    let queue = h.queue(3);
    let push = h.push(&queue);

    push.enqueue_entity_change(&article(7).with_id(7u64), PushOp::Create)
        .unwrap();
    push.process_queues().unwrap();
    assert_eq!(h.objects.len(), 1);

    push.enqueue_entity_change(&article(7).with_id(7u64), PushOp::Delete)
        .unwrap();
    push.process_queues().unwrap();

    assert!(h.objects.is_empty());
    assert!(h.remote.record("R1").is_none());
    assert!(matches!(h.remote.calls().last(), Some(RemoteCall::Delete { .. })));
}

#[test]
fn missing_entity_stays_retryable_until_ceiling() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(2);
    let id = queue.create_item(NewItem::push("M", 7u64, PushOp::Update)).unwrap();
    let push = h.push(&queue);

    let item = claim_all(&queue).remove(0);
    assert!(matches!(
        push.processor().process_item(&item),
        Err(SyncError::EntityNotFound { entity_id: EntityId(7), .. })
    ));
    queue.release_item(id).unwrap();

    let report = push.process_queues().unwrap();
    assert_eq!(report.failed, 1);
    let item = queue.get_item(id).unwrap().unwrap();
    assert_eq!(item.failures, 1);
    assert_eq!(item.expire, 0);

    let report = push.process_queues().unwrap();
    assert_eq!(report.dropped, 1);
    assert!(queue.get_item(id).unwrap().is_none());

    let failures = h
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::Failure { .. }))
        .count();
    assert_eq!(failures, 3);
}

#[test]
fn drain_with_expired_deadline_is_a_no_op() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(3);
    h.remote.insert_record(RemoteRecord::new("R1", "Article__c", 1));
    let pull = h.pull(&queue, PullConfig::new());
    pull.populate_queue(None, None).unwrap();
    let before = queue.items().unwrap();

    let report = pull.process_queue_until(DrainLimit::Until(Instant::now())).unwrap();
    assert_eq!(report.count, 0);
    assert_eq!(queue.items().unwrap(), before);
    assert!(h.entities.is_empty());
}

#[test]
fn suspend_releases_item_and_stops() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(3);
    for i in 0..3 {
        h.remote
            .insert_record(RemoteRecord::new(format!("R{i}"), "Article__c", 1));
    }
    let pull = h.pull(&queue, PullConfig::new().with_time_limit(Duration::ZERO));
    pull.populate_queue(None, None).unwrap();

    h.tokens.set(None);
    let result = pull.process_queue();
    assert!(matches!(result, Err(SyncError::AuthUnavailable)));

    // One claim was made and handed back; the rest were never touched.
    let items = queue.items().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.expire == 0 && i.failures == 0));

    let finished = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::DrainFinished { count, .. } => Some(count),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(finished, vec![1]);
}

#[test]
fn requeued_item_is_not_reclaimed_in_the_same_pass() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(3);

    // Entity 1 is already mapped to another record, so the pull collides.
    let mut taken = MappedObject::new("M".into(), "node")
        .with_entity(EntityId(1))
        .with_remote(RemoteId::from("OTHER"));
    h.objects.save(&mut taken).unwrap();

    h.remote.insert_record(RemoteRecord::new("R1", "Article__c", 1));
    let pull = h.pull(&queue, PullConfig::new().with_time_limit(Duration::ZERO));
    pull.populate_queue(None, None).unwrap();

    let report = pull.process_queue().unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(report.requeued, 1);
    assert_eq!(queue.number_of_items().unwrap(), 1);
}

#[test]
fn pull_round_trip_creates_then_updates() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(3);
    let pull = h.pull(&queue, PullConfig::new().with_time_limit(Duration::ZERO));

    h.remote
        .insert_record(RemoteRecord::new("R1", "Article__c", 9_000).with_field("Name", "First"));
    pull.populate_queue(None, None).unwrap();
    assert_eq!(pull.process_queue().unwrap().done, 1);

    let object = h.objects.all().remove(0);
    let entity_id = object.entity_id.unwrap();
    assert_eq!(
        h.entities.get("node", entity_id.0).unwrap().field("title"),
        Some(&serde_json::json!("First"))
    );

    h.clock.set(20_000);
    h.remote
        .insert_record(RemoteRecord::new("R1", "Article__c", 15_000).with_field("Name", "Second"));
    assert_eq!(pull.populate_queue(None, None).unwrap(), 1);
    pull.process_queue().unwrap();

    assert_eq!(h.objects.len(), 1);
    assert_eq!(
        h.entities.get("node", entity_id.0).unwrap().field("title"),
        Some(&serde_json::json!("Second"))
    );
}

#[test]
fn concurrent_drains_process_each_item_once() {
    let h = Harness::new(vec![mapping_m()]);
    let queue = h.queue(3);
    for i in 0..50 {
        h.remote
            .insert_record(RemoteRecord::new(format!("R{i:02}"), "Article__c", 1));
    }
    let pull = h.pull(&queue, PullConfig::new().with_time_limit(Duration::ZERO));
    assert_eq!(pull.populate_queue(None, None).unwrap(), 50);
    h.sink.clear();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pull = h.pull(&queue, PullConfig::new().with_time_limit(Duration::ZERO));
            thread::spawn(move || pull.process_queue().unwrap().done)
        })
        .collect();
    let done: usize = handles.into_iter().map(|t| t.join().unwrap()).sum();

    assert_eq!(done, 50);
    assert_eq!(h.objects.len(), 50);

    let mut seen = BTreeSet::new();
    for event in h.sink.events() {
        if let SyncEvent::Success { item_id, .. } = event {
            assert!(seen.insert(item_id), "item {item_id} processed twice");
        }
    }
    assert_eq!(seen.len(), 50);
}
