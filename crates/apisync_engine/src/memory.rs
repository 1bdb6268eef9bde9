//! In-memory collaborators for tests and embedding.

use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::storage::{CheckpointKind, CheckpointStore, EntityStorage, MappedObjectStore};
use crate::transport::{RemoteTransport, TokenProvider};
use apisync_protocol::{
    Entity, EntityId, FieldMap, FinalizedQuery, MappedObject, MappedObjectId, MappingId, RemoteId,
    RemoteRecord,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Entity storage backed by a map keyed by (type, id).
#[derive(Debug, Default)]
pub struct MemoryEntityStorage {
    inner: Mutex<(BTreeMap<(String, EntityId), Entity>, u64)>,
}

impl MemoryEntityStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entity with a fixed id.
    pub fn insert(&self, mut entity: Entity, id: u64) {
        let id = EntityId(id);
        entity.id = Some(id);
        let mut inner = self.inner.lock();
        inner.1 = inner.1.max(id.0);
        inner.0.insert((entity.entity_type.clone(), id), entity);
    }

    /// Returns a stored entity.
    pub fn get(&self, entity_type: &str, id: u64) -> Option<Entity> {
        self.inner
            .lock()
            .0
            .get(&(entity_type.to_string(), EntityId(id)))
            .cloned()
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.inner.lock().0.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityStorage for MemoryEntityStorage {
    fn load(&self, entity_type: &str, id: EntityId) -> SyncResult<Option<Entity>> {
        Ok(self
            .inner
            .lock()
            .0
            .get(&(entity_type.to_string(), id))
            .cloned())
    }

    fn save(&self, entity: &mut Entity) -> SyncResult<EntityId> {
        let mut inner = self.inner.lock();
        let id = match entity.id {
            Some(id) => id,
            None => {
                inner.1 += 1;
                EntityId(inner.1)
            }
        };
        entity.id = Some(id);
        inner.0.insert((entity.entity_type.clone(), id), entity.clone());
        Ok(id)
    }

    fn delete(&self, entity: &Entity) -> SyncResult<()> {
        if let Some(id) = entity.id {
            self.inner.lock().0.remove(&(entity.entity_type.clone(), id));
        }
        Ok(())
    }
}

/// Mapped-object storage enforcing both uniqueness constraints.
#[derive(Debug, Default)]
pub struct MemoryMappedObjects {
    inner: Mutex<(BTreeMap<MappedObjectId, MappedObject>, u64)>,
}

impl MemoryMappedObjects {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored objects in id order.
    pub fn all(&self) -> Vec<MappedObject> {
        self.inner.lock().0.values().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.lock().0.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MappedObjectStore for MemoryMappedObjects {
    fn load(&self, id: MappedObjectId) -> SyncResult<Option<MappedObject>> {
        Ok(self.inner.lock().0.get(&id).cloned())
    }

    fn find_by_entity(
        &self,
        mapping: &MappingId,
        entity_id: EntityId,
    ) -> SyncResult<Option<MappedObject>> {
        Ok(self
            .inner
            .lock()
            .0
            .values()
            .find(|o| o.mapping == *mapping && o.entity_id == Some(entity_id))
            .cloned())
    }

    fn find_by_remote(
        &self,
        mapping: &MappingId,
        remote_id: &RemoteId,
    ) -> SyncResult<Option<MappedObject>> {
        Ok(self
            .inner
            .lock()
            .0
            .values()
            .find(|o| o.mapping == *mapping && o.remote_id.as_ref() == Some(remote_id))
            .cloned())
    }

    fn save(&self, object: &mut MappedObject) -> SyncResult<MappedObjectId> {
        let mut inner = self.inner.lock();

        for other in inner.0.values() {
            if (object.id.is_some() && other.id == object.id) || other.mapping != object.mapping {
                continue;
            }
            if object.entity_id.is_some() && other.entity_id == object.entity_id {
                return Err(SyncError::DuplicateMapping {
                    mapping: object.mapping.clone(),
                    message: format!("entity {:?} already mapped", object.entity_id),
                });
            }
            if object.remote_id.is_some() && other.remote_id == object.remote_id {
                return Err(SyncError::DuplicateMapping {
                    mapping: object.mapping.clone(),
                    message: format!("remote record {:?} already mapped", object.remote_id),
                });
            }
        }

        let id = match object.id {
            Some(id) => id,
            None => {
                inner.1 += 1;
                MappedObjectId(inner.1)
            }
        };
        object.id = Some(id);
        inner.0.insert(id, object.clone());
        Ok(id)
    }

    fn delete(&self, id: MappedObjectId) -> SyncResult<()> {
        self.inner.lock().0.remove(&id);
        Ok(())
    }
}

/// Checkpoints kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpoints {
    inner: Mutex<BTreeMap<(MappingId, CheckpointKind), u64>>,
}

impl MemoryCheckpoints {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpoints {
    fn get(&self, mapping: &MappingId, kind: CheckpointKind) -> SyncResult<Option<u64>> {
        Ok(self.inner.lock().get(&(mapping.clone(), kind)).copied())
    }

    fn set(&self, mapping: &MappingId, kind: CheckpointKind, at: u64) -> SyncResult<()> {
        self.inner.lock().insert((mapping.clone(), kind), at);
        Ok(())
    }
}

/// A token provider returning a fixed token, or none.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: Mutex<Option<String>>,
}

impl StaticTokenProvider {
    /// Creates a provider with a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    /// Creates a provider without a token.
    pub fn none() -> Self {
        Self::default()
    }

    /// Replaces the token.
    pub fn set(&self, token: Option<String>) {
        *self.token.lock() = token;
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }
}

/// A sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Forgets received events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}

/// A call made against [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `create`.
    Create {
        /// Object type.
        object_type: String,
        /// Values sent.
        fields: FieldMap,
    },
    /// `update`.
    Update {
        /// Object type.
        object_type: String,
        /// Record id.
        id: RemoteId,
        /// Values sent.
        fields: FieldMap,
    },
    /// `delete`.
    Delete {
        /// Object type.
        object_type: String,
        /// Record id.
        id: RemoteId,
    },
    /// `query`.
    Query(FinalizedQuery),
    /// `retrieve`.
    Retrieve {
        /// Object type.
        object_type: String,
        /// Record id.
        id: RemoteId,
    },
    /// `deleted_since`.
    DeletedSince {
        /// Object type.
        object_type: String,
        /// Lower bound.
        since: u64,
    },
}

#[derive(Debug, Default)]
struct MockRemoteState {
    records: BTreeMap<RemoteId, RemoteRecord>,
    deleted: Vec<(String, RemoteId, u64)>,
    calls: Vec<RemoteCall>,
    failures: VecDeque<SyncError>,
    next_id: u64,
}

/// A remote transport over an in-memory record set.
///
/// Every call is recorded. Errors queued with [`MockRemote::fail_next`] are
/// returned by the next calls, one per call, before touching the records.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: Mutex<MockRemoteState>,
}

impl MockRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a record.
    pub fn insert_record(&self, record: RemoteRecord) {
        self.state.lock().records.insert(record.id.clone(), record);
    }

    /// Returns a record.
    pub fn record(&self, id: &str) -> Option<RemoteRecord> {
        self.state.lock().records.get(&RemoteId::from(id)).cloned()
    }

    /// Removes a record and reports it deleted at `at`.
    pub fn mark_deleted(&self, id: &str, at: u64) {
        let mut state = self.state.lock();
        let id = RemoteId::from(id);
        if let Some(record) = state.records.remove(&id) {
            state.deleted.push((record.object_type, id, at));
        }
    }

    /// Queues an error for the next call.
    pub fn fail_next(&self, error: SyncError) {
        self.state.lock().failures.push_back(error);
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Number of create, update and delete calls.
    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RemoteCall::Create { .. } | RemoteCall::Update { .. } | RemoteCall::Delete { .. }
                )
            })
            .count()
    }

    fn begin(&self, call: RemoteCall) -> SyncResult<parking_lot::MutexGuard<'_, MockRemoteState>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

impl RemoteTransport for MockRemote {
    fn create(&self, object_type: &str, fields: &FieldMap) -> SyncResult<RemoteId> {
        let mut state = self.begin(RemoteCall::Create {
            object_type: object_type.to_string(),
            fields: fields.clone(),
        })?;
        state.next_id += 1;
        let id = RemoteId(format!("R{}", state.next_id));
        let mut record = RemoteRecord::new(id.clone(), object_type, 0);
        record.fields = fields.clone();
        state.records.insert(id.clone(), record);
        Ok(id)
    }

    fn update(&self, object_type: &str, id: &RemoteId, fields: &FieldMap) -> SyncResult<()> {
        let mut state = self.begin(RemoteCall::Update {
            object_type: object_type.to_string(),
            id: id.clone(),
            fields: fields.clone(),
        })?;
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| SyncError::remote_fatal(format!("{object_type} {id} does not exist")))?;
        record
            .fields
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn delete(&self, object_type: &str, id: &RemoteId) -> SyncResult<()> {
        let mut state = self.begin(RemoteCall::Delete {
            object_type: object_type.to_string(),
            id: id.clone(),
        })?;
        state.records.remove(id);
        Ok(())
    }

    fn query(&self, query: &FinalizedQuery) -> SyncResult<Vec<RemoteRecord>> {
        let state = self.begin(RemoteCall::Query(query.clone()))?;
        let limit = query.row_limit().map_or(usize::MAX, |l| l as usize);
        Ok(state
            .records
            .values()
            .filter(|r| r.object_type == query.object_type())
            .filter(|r| query.since().map_or(true, |since| r.modified > since))
            .take(limit)
            .map(|r| select(r, query.fields()))
            .collect())
    }

    fn retrieve(
        &self,
        object_type: &str,
        id: &RemoteId,
        fields: &BTreeSet<String>,
    ) -> SyncResult<Option<RemoteRecord>> {
        let state = self.begin(RemoteCall::Retrieve {
            object_type: object_type.to_string(),
            id: id.clone(),
        })?;
        Ok(state
            .records
            .get(id)
            .filter(|r| r.object_type == object_type)
            .map(|r| select(r, fields)))
    }

    fn deleted_since(&self, object_type: &str, since: u64) -> SyncResult<Vec<RemoteId>> {
        let state = self.begin(RemoteCall::DeletedSince {
            object_type: object_type.to_string(),
            since,
        })?;
        Ok(state
            .deleted
            .iter()
            .filter(|(ty, _, at)| ty == object_type && *at > since)
            .map(|(_, id, _)| id.clone())
            .collect())
    }
}

fn select(record: &RemoteRecord, fields: &BTreeSet<String>) -> RemoteRecord {
    let mut selected = record.clone();
    selected.fields.retain(|name, _| fields.contains(name));
    selected
}
