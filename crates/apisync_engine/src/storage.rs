//! Local storage abstractions: entities, mapped objects and checkpoints.

use crate::error::SyncResult;
use apisync_protocol::{Entity, EntityId, MappedObject, MappedObjectId, MappingId, RemoteId};

/// Local entity storage.
pub trait EntityStorage: Send + Sync {
    /// Loads an entity. `Ok(None)` if it does not exist.
    fn load(&self, entity_type: &str, id: EntityId) -> SyncResult<Option<Entity>>;

    /// Saves an entity, assigning an id to new ones.
    fn save(&self, entity: &mut Entity) -> SyncResult<EntityId>;

    /// Deletes an entity.
    fn delete(&self, entity: &Entity) -> SyncResult<()>;
}

/// Durable mapped-object storage.
///
/// Implementations must enforce uniqueness of (mapping, entity) and
/// (mapping, remote id), returning
/// [`SyncError::DuplicateMapping`](crate::SyncError::DuplicateMapping) on
/// collision.
pub trait MappedObjectStore: Send + Sync {
    /// Loads by id.
    fn load(&self, id: MappedObjectId) -> SyncResult<Option<MappedObject>>;

    /// Finds the object linking `entity_id` under `mapping`.
    fn find_by_entity(
        &self,
        mapping: &MappingId,
        entity_id: EntityId,
    ) -> SyncResult<Option<MappedObject>>;

    /// Finds the object linking `remote_id` under `mapping`.
    fn find_by_remote(
        &self,
        mapping: &MappingId,
        remote_id: &RemoteId,
    ) -> SyncResult<Option<MappedObject>>;

    /// Inserts or updates, assigning an id to new objects.
    fn save(&self, object: &mut MappedObject) -> SyncResult<MappedObjectId>;

    /// Deletes by id. Deleting a missing object is not an error.
    fn delete(&self, id: MappedObjectId) -> SyncResult<()>;
}

/// Which pull checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckpointKind {
    /// Last modified-record query.
    Pull,
    /// Last deleted-record query.
    Delete,
}

/// Per-mapping pull checkpoints (Unix seconds).
pub trait CheckpointStore: Send + Sync {
    /// Returns the checkpoint, or `None` before the first pull.
    fn get(&self, mapping: &MappingId, kind: CheckpointKind) -> SyncResult<Option<u64>>;

    /// Stores a checkpoint.
    fn set(&self, mapping: &MappingId, kind: CheckpointKind, at: u64) -> SyncResult<()>;
}
