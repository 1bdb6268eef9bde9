//! Mapped-object resolution.

use crate::error::SyncResult;
use crate::storage::MappedObjectStore;
use apisync_protocol::{MappedObject, Mapping, QueueItem};
use tracing::debug;

/// Finds or constructs the mapped object a queue item refers to.
///
/// Lookup order:
/// 1. the mapped-object id carried on the item, if it loads and belongs to
///    the mapping
/// 2. the (mapping, entity) pair
/// 3. for pull items, the (mapping, remote id) pair of the payload
/// 4. a new unsaved object scoped to the mapping and the item's entity or
///    remote id
///
/// Step 2 is what keeps two items for the same untracked entity from
/// creating two objects: the second resolves to whatever the first saved.
pub struct MappedObjectResolver<'a> {
    store: &'a dyn MappedObjectStore,
}

impl<'a> MappedObjectResolver<'a> {
    /// Creates a resolver over `store`.
    pub fn new(store: &'a dyn MappedObjectStore) -> Self {
        Self { store }
    }

    /// Resolves `item` under `mapping`. Never returns "nothing": the fallback
    /// is an unsaved object the caller may persist.
    pub fn resolve(&self, item: &QueueItem, mapping: &Mapping) -> SyncResult<MappedObject> {
        if let Some(id) = item.mapped_object_id {
            if let Some(object) = self.store.load(id)? {
                if object.mapping == mapping.id {
                    return Ok(object);
                }
                debug!(mapped_object_id = %id, mapping = %mapping.id, "mapped object belongs to another mapping");
            }
        }

        if let Some(entity_id) = item.entity_id {
            if let Some(object) = self.store.find_by_entity(&mapping.id, entity_id)? {
                return Ok(object);
            }
        }

        let remote_id = item.payload.as_ref().map(|record| record.id.clone());
        if item.pull_op().is_some() {
            if let Some(remote_id) = &remote_id {
                if let Some(object) = self.store.find_by_remote(&mapping.id, remote_id)? {
                    return Ok(object);
                }
            }
        }

        let mut object = MappedObject::new(mapping.id.clone(), mapping.entity_type.clone());
        object.entity_id = item.entity_id;
        if item.pull_op().is_some() {
            object.remote_id = remote_id;
        }
        Ok(object)
    }
}
