//! Queue items.

use crate::ids::{EntityId, ItemId, MappedObjectId, MappingId};
use crate::record::RemoteRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation carried by a push item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOp {
    /// The local entity was created.
    Create,
    /// The local entity was updated.
    Update,
    /// The local entity was deleted.
    Delete,
}

impl PushOp {
    /// Combines a pending operation with a newer one for the same entity.
    ///
    /// A delete always wins. A pending create absorbs later updates, since the
    /// remote record does not exist yet.
    pub fn merge(self, newer: PushOp) -> PushOp {
        match (self, newer) {
            (_, PushOp::Delete) => PushOp::Delete,
            (PushOp::Create, PushOp::Update) => PushOp::Create,
            (_, newer) => newer,
        }
    }
}

/// Operation carried by a pull item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullOp {
    /// Create or update the local entity from the record snapshot.
    Upsert,
    /// The remote record was deleted.
    Delete,
}

/// The `op` column of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOp {
    /// Local → remote.
    Push(PushOp),
    /// Remote → local.
    Pull(PullOp),
}

impl ItemOp {
    /// Short name used in logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOp::Push(PushOp::Create) => "push_create",
            ItemOp::Push(PushOp::Update) => "push_update",
            ItemOp::Push(PushOp::Delete) => "push_delete",
            ItemOp::Pull(PullOp::Upsert) => "pull_upsert",
            ItemOp::Pull(PullOp::Delete) => "pull_delete",
        }
    }

    /// Returns true for either delete variant.
    pub fn is_delete(&self) -> bool {
        matches!(self, ItemOp::Push(PushOp::Delete) | ItemOp::Pull(PullOp::Delete))
    }
}

impl fmt::Display for ItemOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller hands to `create_item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    /// Mapping name.
    pub name: MappingId,
    /// Local entity, when known.
    pub entity_id: Option<EntityId>,
    /// Mapped object, when known.
    pub mapped_object_id: Option<MappedObjectId>,
    /// Operation.
    pub op: ItemOp,
    /// Bypass the stale-record check on pull.
    pub force: bool,
    /// Remote record snapshot (pull only).
    pub payload: Option<RemoteRecord>,
}

impl NewItem {
    /// Creates a push item for a local entity.
    pub fn push(name: impl Into<MappingId>, entity_id: impl Into<EntityId>, op: PushOp) -> Self {
        Self {
            name: name.into(),
            entity_id: Some(entity_id.into()),
            mapped_object_id: None,
            op: ItemOp::Push(op),
            force: false,
            payload: None,
        }
    }

    /// Creates a pull item carrying a record snapshot.
    pub fn pull(name: impl Into<MappingId>, record: RemoteRecord, op: PullOp) -> Self {
        Self {
            name: name.into(),
            entity_id: None,
            mapped_object_id: None,
            op: ItemOp::Pull(op),
            force: false,
            payload: Some(record),
        }
    }

    /// Sets the mapped object id.
    pub fn with_mapped_object(mut self, id: MappedObjectId) -> Self {
        self.mapped_object_id = Some(id);
        self
    }

    /// Marks the item as forced.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// A stored queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Item id.
    pub id: ItemId,
    /// Mapping name.
    pub name: MappingId,
    /// Local entity, when known.
    pub entity_id: Option<EntityId>,
    /// Mapped object, when known.
    pub mapped_object_id: Option<MappedObjectId>,
    /// Operation.
    pub op: ItemOp,
    /// Number of failed attempts so far.
    pub failures: u32,
    /// Unix time until which the item is leased or backed off; 0 when free.
    pub expire: u64,
    /// Unix time of creation.
    pub created: u64,
    /// Unix time of last modification.
    pub updated: u64,
    /// Bypass the stale-record check on pull.
    pub force: bool,
    /// Remote record snapshot (pull only).
    pub payload: Option<RemoteRecord>,
}

impl QueueItem {
    /// Builds a stored item from a draft.
    pub fn from_new(id: ItemId, item: NewItem, now: u64) -> Self {
        Self {
            id,
            name: item.name,
            entity_id: item.entity_id,
            mapped_object_id: item.mapped_object_id,
            op: item.op,
            failures: 0,
            expire: 0,
            created: now,
            updated: now,
            force: item.force,
            payload: item.payload,
        }
    }

    /// Returns true if a claimant may take the item at `now`.
    pub fn is_available(&self, now: u64) -> bool {
        self.expire <= now
    }

    /// Returns the push operation, if this is a push item.
    pub fn push_op(&self) -> Option<PushOp> {
        match self.op {
            ItemOp::Push(op) => Some(op),
            ItemOp::Pull(_) => None,
        }
    }

    /// Returns the pull operation, if this is a pull item.
    pub fn pull_op(&self) -> Option<PullOp> {
        match self.op {
            ItemOp::Pull(op) => Some(op),
            ItemOp::Push(_) => None,
        }
    }
}
