//! Standalone endpoint tests against in-memory collaborators.

use apisync_engine::{
    MappingRegistry, MemoryEntityStorage, MemoryMappedObjects, MockRemote, PullConfig, PullQueue,
    PushConfig, PushQueue, RemoteCall, StaticTokenProvider, SyncContext,
};
use apisync_protocol::{Direction, Entity, Mapping, NewItem, PushOp, RemoteRecord};
use apisync_queue::{BackoffPolicy, MemoryQueue, QueueConfig, QueueStore};
use apisync_server::{
    EndpointResponse, HandlerContext, RequestHandler, ServerConfig, StandaloneRequest,
};
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "cron-secret";

struct Fixture {
    entities: Arc<MemoryEntityStorage>,
    remote: Arc<MockRemote>,
    tokens: Arc<StaticTokenProvider>,
    pull_queue: Arc<MemoryQueue>,
    push_queue: Arc<MemoryQueue>,
    handler: RequestHandler,
}

fn mappings() -> Vec<Mapping> {
    vec![
        Mapping::new("contact", "user", "user", "Contact")
            .with_field("name", "LastName", Direction::Sync)
            .with_standalone(true, true),
        Mapping::new("account", "node", "org", "Account")
            .with_field("title", "Name", Direction::Sync),
    ]
}

fn fixture(config: ServerConfig) -> Fixture {
    let entities = Arc::new(MemoryEntityStorage::new());
    let remote = Arc::new(MockRemote::new());
    let tokens = Arc::new(StaticTokenProvider::new("token"));
    let registry = MappingRegistry::new(mappings());

    let ctx = Arc::new(SyncContext::new(
        registry.clone(),
        entities.clone(),
        Arc::new(MemoryMappedObjects::new()),
        remote.clone(),
        tokens.clone(),
    ));

    let queue_config = QueueConfig::new(3, BackoffPolicy::none());
    let pull_queue = Arc::new(MemoryQueue::new(queue_config.clone()));
    let push_queue = Arc::new(MemoryQueue::new(queue_config));

    let pull = Arc::new(PullQueue::new(
        ctx.clone(),
        pull_queue.clone(),
        PullConfig::new().with_time_limit(Duration::ZERO),
    ));
    let push = Arc::new(PushQueue::new(ctx, push_queue.clone(), PushConfig::new()));

    let context = HandlerContext::new(config, Arc::new(registry), pull, push);

    Fixture {
        entities,
        remote,
        tokens,
        pull_queue,
        push_queue,
        handler: RequestHandler::new(Arc::new(context)),
    }
}

fn contact_record(id: &str, name: &str) -> RemoteRecord {
    RemoteRecord::new(id, "Contact", 1_000).with_field("LastName", name)
}

#[test]
fn wrong_key_is_forbidden() {
    let f = fixture(ServerConfig::new(KEY));
    f.remote.insert_record(contact_record("003A", "Lovelace"));

    let response = f
        .handler
        .handle_pull(&StandaloneRequest::new("guess").with_mapping("contact"));
    assert_eq!(response, EndpointResponse::Forbidden);
    assert!(f.remote.calls().is_empty());
    assert_eq!(f.pull_queue.number_of_items().unwrap(), 0);
}

#[test]
fn empty_cron_key_disables_endpoints() {
    let f = fixture(ServerConfig::new("").with_standalone_pull(true));
    let response = f.handler.handle_pull(&StandaloneRequest::new(""));
    assert_eq!(response.status(), 403);
}

#[test]
fn unknown_mapping_is_not_found() {
    let f = fixture(ServerConfig::new(KEY));
    let response = f
        .handler
        .handle_push(&StandaloneRequest::new(KEY).with_mapping("missing"));
    assert_eq!(response, EndpointResponse::NotFound);
}

#[test]
fn mapping_without_standalone_flag_is_forbidden() {
    let f = fixture(ServerConfig::new(KEY));
    let response = f
        .handler
        .handle_pull(&StandaloneRequest::new(KEY).with_mapping("account"));
    assert_eq!(response, EndpointResponse::Forbidden);
}

#[test]
fn global_switch_gates_requests_without_mapping() {
    let f = fixture(ServerConfig::new(KEY));
    assert_eq!(
        f.handler.handle_pull(&StandaloneRequest::new(KEY)),
        EndpointResponse::Forbidden
    );
    assert_eq!(
        f.handler.handle_push(&StandaloneRequest::new(KEY)),
        EndpointResponse::Forbidden
    );

    let f = fixture(
        ServerConfig::new(KEY)
            .with_standalone_pull(true)
            .with_standalone_push(true),
    );
    assert_eq!(
        f.handler.handle_pull(&StandaloneRequest::new(KEY)),
        EndpointResponse::NoContent
    );
    assert_eq!(
        f.handler.handle_push(&StandaloneRequest::new(KEY)),
        EndpointResponse::NoContent
    );
}

#[test]
fn pull_populates_and_drains() {
    let f = fixture(ServerConfig::new(KEY));
    f.remote.insert_record(contact_record("003A", "Lovelace"));
    f.remote.insert_record(contact_record("003B", "Hopper"));

    let response = f
        .handler
        .handle_pull(&StandaloneRequest::new(KEY).with_mapping("contact"));
    assert_eq!(response, EndpointResponse::NoContent);
    assert_eq!(f.pull_queue.number_of_items().unwrap(), 0);
    assert_eq!(f.entities.len(), 2);
}

#[test]
fn single_record_pull() {
    let f = fixture(ServerConfig::new(KEY));
    f.remote.insert_record(contact_record("003A", "Lovelace"));
    f.remote.insert_record(contact_record("003B", "Hopper"));

    let response = f.handler.handle_pull(
        &StandaloneRequest::new(KEY)
            .with_mapping("contact")
            .with_remote_id("003B"),
    );
    assert_eq!(response, EndpointResponse::NoContent);
    assert_eq!(f.entities.len(), 1);
}

#[test]
fn push_with_destination_redirects() {
    let f = fixture(ServerConfig::new(KEY));
    f.entities
        .insert(Entity::new("user", "user").with_field("name", "Turing"), 5);
    f.push_queue
        .create_item(NewItem::push("contact", 5u64, PushOp::Create))
        .unwrap();

    let response = f.handler.handle_push(
        &StandaloneRequest::new(KEY)
            .with_mapping("contact")
            .with_destination("/admin/sync"),
    );
    assert_eq!(response, EndpointResponse::Redirect("/admin/sync".to_string()));
    assert_eq!(response.status(), 302);
    assert_eq!(f.push_queue.number_of_items().unwrap(), 0);
    assert!(matches!(f.remote.calls()[0], RemoteCall::Create { .. }));
}

#[test]
fn processing_errors_are_logged_not_returned() {
    let f = fixture(ServerConfig::new(KEY));
    f.tokens.set(None);
    f.remote.insert_record(contact_record("003A", "Lovelace"));

    let response = f
        .handler
        .handle_pull(&StandaloneRequest::new(KEY).with_mapping("contact"));
    assert_eq!(response, EndpointResponse::NoContent);
    assert!(f.entities.is_empty());
}
