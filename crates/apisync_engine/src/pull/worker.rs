//! Applies one pulled record to local storage.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::resolver::MappedObjectResolver;
use apisync_protocol::{
    Entity, MappedObject, Mapping, PullOp, QueueItem, RemoteRecord, SyncAction,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of processing one pull item, matched by the drain loop.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Finished; delete the item.
    Done,
    /// Transient condition; release the item without counting a failure.
    Requeue,
    /// The whole queue is unhealthy; release and stop the pass.
    Suspend(SyncError),
    /// The item failed; apply the queue failure policy.
    Failed(SyncError),
}

impl From<SyncResult<()>> for WorkerOutcome {
    fn from(result: SyncResult<()>) -> Self {
        match result {
            Ok(()) => WorkerOutcome::Done,
            Err(e) if e.is_suspend() => WorkerOutcome::Suspend(e),
            Err(e) if e.is_requeue() => WorkerOutcome::Requeue,
            Err(e) => WorkerOutcome::Failed(e),
        }
    }
}

/// Processes pull items.
pub struct PullWorker {
    ctx: Arc<SyncContext>,
}

impl PullWorker {
    /// Creates a worker.
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Processes one claimed item.
    pub fn process_item(&self, item: &QueueItem) -> WorkerOutcome {
        self.apply(item).into()
    }

    fn apply(&self, item: &QueueItem) -> SyncResult<()> {
        self.ctx.require_token()?;
        let mapping = self.ctx.mapping(&item.name)?;
        let op = item.pull_op().ok_or_else(|| {
            SyncError::InvalidRequest(format!("item {} is not a pull item", item.id))
        })?;
        let record = item.payload.as_ref().ok_or_else(|| {
            SyncError::InvalidRequest(format!("pull item {} has no record", item.id))
        })?;

        if !mapping.triggers.pulls_op(op) {
            debug!(item_id = %item.id, mapping = %mapping.id, "pull trigger disabled, skipping");
            return Ok(());
        }

        let mut object =
            MappedObjectResolver::new(self.ctx.mapped_objects.as_ref()).resolve(item, mapping)?;

        let result = match op {
            PullOp::Delete => self.pull_delete(mapping, item, record, &object),
            PullOp::Upsert => self.pull_upsert(mapping, item, record, &mut object),
        };

        if let Err(e) = &result {
            self.ctx.notify(SyncEvent::Failure {
                mapping: mapping.id.clone(),
                item_id: item.id,
                op: item.op,
                message: e.to_string(),
            });
            if !object.is_new() && !e.is_requeue() {
                let action = match op {
                    PullOp::Delete => SyncAction::PullDelete,
                    PullOp::Upsert => SyncAction::PullUpdate,
                };
                object.record_failure(action, e.to_string());
                object.changed = self.ctx.now();
                if let Err(save) = self.ctx.mapped_objects.save(&mut object) {
                    warn!(mapped_object_id = ?object.id, error = %save, "failed to record sync failure");
                }
            }
        }
        result
    }

    fn pull_delete(
        &self,
        mapping: &Mapping,
        item: &QueueItem,
        record: &RemoteRecord,
        object: &MappedObject,
    ) -> SyncResult<()> {
        let Some(id) = object.id else {
            debug!(item_id = %item.id, remote_id = %record.id, "deleted record was never pulled");
            return Ok(());
        };

        self.ctx.notify(SyncEvent::PullBefore {
            mapping: mapping.id.clone(),
            item_id: item.id,
            op: item.op,
            remote_id: record.id.clone(),
        });

        if let Some(entity_id) = object.entity_id {
            if let Some(entity) = self.ctx.entities.load(&mapping.entity_type, entity_id)? {
                self.ctx.entities.delete(&entity)?;
            }
        }
        self.ctx.mapped_objects.delete(id)?;

        self.ctx.notify(SyncEvent::Success {
            mapping: mapping.id.clone(),
            item_id: item.id,
            op: item.op,
            remote_id: Some(record.id.clone()),
        });
        Ok(())
    }

    fn pull_upsert(
        &self,
        mapping: &Mapping,
        item: &QueueItem,
        record: &RemoteRecord,
        object: &mut MappedObject,
    ) -> SyncResult<()> {
        let (mut entity, action) = if object.is_new() {
            if !mapping.triggers.pull_create {
                debug!(item_id = %item.id, remote_id = %record.id, "pull create disabled, skipping");
                return Ok(());
            }
            (
                Entity::new(mapping.entity_type.clone(), mapping.bundle.clone()),
                SyncAction::PullCreate,
            )
        } else {
            if !mapping.triggers.pull_update {
                debug!(item_id = %item.id, remote_id = %record.id, "pull update disabled, skipping");
                return Ok(());
            }
            if !item.force && record.modified <= object.last_sync {
                debug!(item_id = %item.id, remote_id = %record.id, modified = record.modified, last_sync = object.last_sync, "record not newer than last sync, skipping");
                return Ok(());
            }
            let entity_id = object.entity_id.ok_or_else(|| {
                SyncError::InvalidRequest(format!("mapped object {:?} has no entity", object.id))
            })?;
            let entity = self
                .ctx
                .entities
                .load(&mapping.entity_type, entity_id)?
                .ok_or_else(|| SyncError::EntityNotFound {
                    entity_type: mapping.entity_type.clone(),
                    entity_id,
                })?;
            (entity, SyncAction::PullUpdate)
        };

        self.ctx.notify(SyncEvent::PullBefore {
            mapping: mapping.id.clone(),
            item_id: item.id,
            op: item.op,
            remote_id: record.id.clone(),
        });

        mapping.apply_pull(record, &mut entity);
        let entity_id = self.ctx.entities.save(&mut entity)?;

        let now = self.ctx.now();
        object.entity_id = Some(entity_id);
        object.remote_id = Some(record.id.clone());
        object.record_success(
            action,
            now.max(record.modified),
            format!("pulled {} {}", record.object_type, record.id),
        );
        object.changed = now;
        if let Err(e) = self.ctx.mapped_objects.save(object) {
            if action == SyncAction::PullCreate {
                // Drop the entity created above so a retry does not create a second one.
                entity.id = Some(entity_id);
                if let Err(cleanup) = self.ctx.entities.delete(&entity) {
                    warn!(entity_id = %entity_id, error = %cleanup, "failed to remove unmapped entity");
                }
                object.entity_id = None;
            }
            return Err(e);
        }

        self.ctx.notify(SyncEvent::Success {
            mapping: mapping.id.clone(),
            item_id: item.id,
            op: item.op,
            remote_id: Some(record.id.clone()),
        });
        Ok(())
    }
}
