//! Mapped objects: the durable link between one local entity and one
//! remote record under one mapping.

use crate::ids::{EntityId, MappedObjectId, MappingId, RemoteId};
use serde::{Deserialize, Serialize};

/// Last synchronization action recorded on a mapped object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Pushed a new remote record.
    PushCreate,
    /// Pushed an update.
    PushUpdate,
    /// Pushed a delete.
    PushDelete,
    /// Created a local entity from a remote record.
    PullCreate,
    /// Updated a local entity from a remote record.
    PullUpdate,
    /// Deleted a local entity after a remote delete.
    PullDelete,
}

/// Correlation record between a local entity and a remote record.
///
/// A mapped object without an `id` has never been saved. The resolver hands
/// out such objects freely; persistence is deferred until a sync succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedObject {
    /// Id; `None` until saved.
    pub id: Option<MappedObjectId>,
    /// Mapping this record belongs to.
    pub mapping: MappingId,
    /// Local entity type.
    pub entity_type: String,
    /// Local entity id, once known.
    pub entity_id: Option<EntityId>,
    /// Remote record id, once known.
    pub remote_id: Option<RemoteId>,
    /// Last action attempted.
    pub last_sync_action: Option<SyncAction>,
    /// Whether the last action succeeded.
    pub last_sync_status: bool,
    /// Message describing the last action.
    pub last_sync_message: Option<String>,
    /// Revision log message for the last save.
    pub revision_log: Option<String>,
    /// Unix time of the last successful sync.
    pub last_sync: u64,
    /// Unix time of the last save.
    pub changed: u64,
}

impl MappedObject {
    /// Creates an unsaved mapped object.
    pub fn new(mapping: MappingId, entity_type: impl Into<String>) -> Self {
        Self {
            id: None,
            mapping,
            entity_type: entity_type.into(),
            entity_id: None,
            remote_id: None,
            last_sync_action: None,
            last_sync_status: false,
            last_sync_message: None,
            revision_log: None,
            last_sync: 0,
            changed: 0,
        }
    }

    /// Sets the local entity id.
    pub fn with_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Sets the remote id.
    pub fn with_remote(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    /// Returns true if this object has never been saved.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Records a successful action.
    pub fn record_success(&mut self, action: SyncAction, now: u64, message: impl Into<String>) {
        let message = message.into();
        self.last_sync_action = Some(action);
        self.last_sync_status = true;
        self.revision_log = Some(message.clone());
        self.last_sync_message = Some(message);
        self.last_sync = now;
    }

    /// Records a failed action. `last_sync` is left untouched.
    pub fn record_failure(&mut self, action: SyncAction, message: impl Into<String>) {
        let message = message.into();
        self.last_sync_action = Some(action);
        self.last_sync_status = false;
        self.revision_log = Some(format!("sync failed: {message}"));
        self.last_sync_message = Some(message);
    }
}
