//! Collaborators shared by the push and pull pipelines.

use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::hooks::{PushGuard, PushVerdict, QueryAlter};
use crate::mappings::MappingRegistry;
use crate::memory::MemoryCheckpoints;
use crate::storage::{CheckpointStore, EntityStorage, MappedObjectStore};
use crate::transport::{RemoteTransport, TokenProvider};
use apisync_protocol::{
    FinalizedQuery, MappedObject, Mapping, MappingId, PullQuery, QueueItem,
};
use apisync_queue::{Clock, SystemClock};
use std::sync::Arc;

/// Everything the engine talks to, injected at construction.
pub struct SyncContext {
    /// Configured mappings.
    pub mappings: Arc<MappingRegistry>,
    /// Local entity storage.
    pub entities: Arc<dyn EntityStorage>,
    /// Mapped-object storage.
    pub mapped_objects: Arc<dyn MappedObjectStore>,
    /// Remote API.
    pub remote: Arc<dyn RemoteTransport>,
    /// Remote credentials.
    pub tokens: Arc<dyn TokenProvider>,
    /// Pull checkpoints.
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Notification bus.
    pub events: Arc<EventBus>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    query_alters: Vec<Arc<dyn QueryAlter>>,
    push_guards: Vec<Arc<dyn PushGuard>>,
}

impl SyncContext {
    /// Creates a context with in-memory checkpoints, a tracing event bus
    /// and the system clock.
    pub fn new(
        mappings: MappingRegistry,
        entities: Arc<dyn EntityStorage>,
        mapped_objects: Arc<dyn MappedObjectStore>,
        remote: Arc<dyn RemoteTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            mappings: Arc::new(mappings),
            entities,
            mapped_objects,
            remote,
            tokens,
            checkpoints: Arc::new(MemoryCheckpoints::new()),
            events: Arc::new(EventBus::with_tracing()),
            clock: Arc::new(SystemClock),
            query_alters: Vec::new(),
            push_guards: Vec::new(),
        }
    }

    /// Sets the checkpoint store.
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Sets the event bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a query-alter hook. Hooks run in registration order.
    pub fn with_query_alter(mut self, hook: Arc<dyn QueryAlter>) -> Self {
        self.query_alters.push(hook);
        self
    }

    /// Registers a push guard.
    pub fn with_push_guard(mut self, guard: Arc<dyn PushGuard>) -> Self {
        self.push_guards.push(guard);
        self
    }

    /// Looks up a mapping or fails with `MappingNotFound`.
    pub fn mapping(&self, id: &MappingId) -> SyncResult<&Mapping> {
        self.mappings
            .get(id)
            .ok_or_else(|| SyncError::MappingNotFound(id.clone()))
    }

    /// Fails with `AuthUnavailable` if there is no token.
    pub fn require_token(&self) -> SyncResult<String> {
        self.tokens.token().ok_or(SyncError::AuthUnavailable)
    }

    /// Passes `query` through every query-alter hook and freezes it.
    pub fn finalize_query(&self, mapping: &Mapping, query: PullQuery) -> SyncResult<FinalizedQuery> {
        let query = self
            .query_alters
            .iter()
            .fold(query, |query, hook| hook.alter(mapping, query));
        Ok(query.finalize()?)
    }

    /// Returns the first veto among the push guards.
    pub fn check_push_guards(
        &self,
        mapping: &Mapping,
        item: &QueueItem,
        object: &MappedObject,
    ) -> PushVerdict {
        self.push_guards
            .iter()
            .map(|guard| guard.check(mapping, item, object))
            .find(|verdict| *verdict != PushVerdict::Allow)
            .unwrap_or(PushVerdict::Allow)
    }

    /// Publishes an event.
    pub fn notify(&self, event: SyncEvent) {
        self.events.publish(event);
    }

    /// Current Unix time.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}
