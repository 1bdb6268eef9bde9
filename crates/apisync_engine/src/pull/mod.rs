//! Pull processing: remote records to local entities.
//!
//! [`PullQueue::populate_queue`] asks the remote for records changed since
//! each mapping's checkpoint and enqueues one item per record.
//! [`PullQueue::process_queue`] then drains the queue inside a time budget,
//! handing each item to the [`PullWorker`].

mod drain;
mod worker;

pub use drain::{DrainLimit, DrainReport};
pub use worker::{PullWorker, WorkerOutcome};

use crate::config::PullConfig;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::events::{NoticeLevel, SyncEvent};
use crate::storage::CheckpointKind;
use apisync_protocol::{
    Mapping, MappingId, NewItem, PullOp, PullQuery, RemoteId, RemoteRecord,
};
use apisync_queue::{ClaimRequest, QueueStore};
use drain::ClaimGuard;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pull queue runner.
pub struct PullQueue {
    ctx: Arc<SyncContext>,
    queue: Arc<dyn QueueStore>,
    config: PullConfig,
    worker: PullWorker,
}

impl PullQueue {
    /// Creates a runner over `queue`.
    pub fn new(ctx: Arc<SyncContext>, queue: Arc<dyn QueueStore>, config: PullConfig) -> Self {
        let worker = PullWorker::new(Arc::clone(&ctx));
        Self {
            ctx,
            queue,
            config,
            worker,
        }
    }

    /// The underlying queue.
    pub fn queue(&self) -> &Arc<dyn QueueStore> {
        &self.queue
    }

    /// Enqueues pull work and returns the number of items created.
    ///
    /// With a remote id (which requires a mapping) exactly that record is
    /// fetched and enqueued as a forced upsert. Otherwise the given mapping,
    /// or every standalone-pull mapping, is queried for records changed
    /// since its checkpoint. A failing mapping is logged and skipped unless
    /// the failure suspends the whole pass.
    pub fn populate_queue(
        &self,
        mapping: Option<&MappingId>,
        remote_id: Option<&RemoteId>,
    ) -> SyncResult<usize> {
        self.ctx.require_token()?;

        if let Some(remote_id) = remote_id {
            let mapping = mapping.ok_or_else(|| {
                SyncError::InvalidRequest("a remote id requires a mapping".to_string())
            })?;
            return self.populate_single(self.ctx.mapping(mapping)?, remote_id);
        }

        let mappings: Vec<&Mapping> = match mapping {
            Some(id) => vec![self.ctx.mapping(id)?],
            None => self.ctx.mappings.pull_standalone().collect(),
        };

        let mut total = 0;
        for mapping in mappings {
            match self.populate_mapping(mapping) {
                Ok(count) => total += count,
                Err(e) if e.is_suspend() => return Err(e),
                Err(e) => {
                    error!(mapping = %mapping.id, error = %e, "pull populate failed");
                    self.ctx.notify(SyncEvent::notice(
                        NoticeLevel::Error,
                        format!("pull populate for {} failed: {e}", mapping.id),
                    ));
                }
            }
        }
        Ok(total)
    }

    fn populate_single(&self, mapping: &Mapping, remote_id: &RemoteId) -> SyncResult<usize> {
        let query = self
            .ctx
            .finalize_query(mapping, PullQuery::for_mapping(mapping))?;

        let record = self
            .ctx
            .remote
            .retrieve(query.object_type(), remote_id, query.fields())?;

        match record {
            Some(record) => {
                let id = self
                    .queue
                    .create_item(NewItem::pull(mapping.id.clone(), record, PullOp::Upsert).forced())?;
                debug!(item_id = %id, mapping = %mapping.id, remote_id = %remote_id, "single record enqueued");
                Ok(1)
            }
            None => {
                warn!(mapping = %mapping.id, remote_id = %remote_id, "remote record not found");
                self.ctx.notify(SyncEvent::notice(
                    NoticeLevel::Warning,
                    format!("{} {remote_id} not found", mapping.remote_object_type),
                ));
                Ok(0)
            }
        }
    }

    fn populate_mapping(&self, mapping: &Mapping) -> SyncResult<usize> {
        let queued = self.queue.number_of_items()?;
        if queued >= self.config.max_queue_size {
            warn!(mapping = %mapping.id, queued, max = self.config.max_queue_size, "pull queue full, skipping populate");
            return Ok(0);
        }

        let started = self.ctx.now();
        let mut count = 0;

        if mapping.triggers.pull_create || mapping.triggers.pull_update {
            let since = self.ctx.checkpoints.get(&mapping.id, CheckpointKind::Pull)?;
            let mut query = PullQuery::for_mapping(mapping);
            if let Some(since) = since {
                query = query.modified_since(since);
            }
            if let Some(limit) = self.config.query_limit {
                query = query.limit(limit);
            }
            let query = self.ctx.finalize_query(mapping, query)?;

            for record in self.ctx.remote.query(&query)? {
                self.queue
                    .create_item(NewItem::pull(mapping.id.clone(), record, PullOp::Upsert))?;
                count += 1;
            }
            self.ctx
                .checkpoints
                .set(&mapping.id, CheckpointKind::Pull, started)?;
        }

        if mapping.triggers.pull_delete {
            let since = self
                .ctx
                .checkpoints
                .get(&mapping.id, CheckpointKind::Delete)?
                .unwrap_or(0);
            for remote_id in self
                .ctx
                .remote
                .deleted_since(&mapping.remote_object_type, since)?
            {
                let stub = RemoteRecord::new(remote_id, mapping.remote_object_type.clone(), started);
                self.queue
                    .create_item(NewItem::pull(mapping.id.clone(), stub, PullOp::Delete))?;
                count += 1;
            }
            self.ctx
                .checkpoints
                .set(&mapping.id, CheckpointKind::Delete, started)?;
        }

        info!(mapping = %mapping.id, count, "pull queue populated");
        Ok(count)
    }

    /// Drains the queue within the configured time limit.
    pub fn process_queue(&self) -> SyncResult<DrainReport> {
        self.process_queue_until(DrainLimit::from_time_limit(self.config.time_limit))
    }

    /// Drains the queue until `limit` expires or the queue is empty.
    ///
    /// The limit is checked before each claim, never during an item. Requeued
    /// items are not claimed again in the same pass. A suspend releases the
    /// current item and returns the error without claiming further.
    pub fn process_queue_until(&self, limit: DrainLimit) -> SyncResult<DrainReport> {
        let started = Instant::now();
        self.ctx.notify(SyncEvent::DrainStarted {
            queued: self.queue.number_of_items()?,
        });

        let mut report = DrainReport::default();
        let result = self.drain(limit, &mut report);

        report.elapsed = started.elapsed();
        self.ctx.notify(SyncEvent::DrainFinished {
            count: report.count,
            elapsed: report.elapsed,
        });

        result.map(|()| report)
    }

    fn drain(&self, limit: DrainLimit, report: &mut DrainReport) -> SyncResult<()> {
        let mut requeued = BTreeSet::new();

        while !limit.expired() {
            let request =
                ClaimRequest::new(self.config.lease).excluding(requeued.iter().copied());
            let Some(item) = self.queue.claim(&request)?.into_iter().next() else {
                break;
            };

            let mut guard = ClaimGuard::new(self.queue.as_ref(), item.id);
            report.count += 1;

            match self.worker.process_item(&item) {
                WorkerOutcome::Done => {
                    self.queue.delete_item(item.id)?;
                    guard.disarm();
                    report.done += 1;
                }
                WorkerOutcome::Requeue => {
                    self.queue.release_item(item.id)?;
                    guard.disarm();
                    requeued.insert(item.id);
                    report.requeued += 1;
                }
                WorkerOutcome::Suspend(e) => {
                    self.queue.release_item(item.id)?;
                    guard.disarm();
                    warn!(item_id = %item.id, error = %e, "pull queue suspended");
                    return Err(e);
                }
                WorkerOutcome::Failed(e) if !e.is_retryable() => {
                    error!(item_id = %item.id, mapping = %item.name, op = %item.op, error = %e, "pull item failed permanently");
                    self.queue.delete_item(item.id)?;
                    guard.disarm();
                    report.dropped += 1;
                }
                WorkerOutcome::Failed(e) => {
                    guard.disarm();
                    match self.queue.fail_item(item.id, &e.to_string()) {
                        Ok(outcome) => {
                            debug!(item_id = %item.id, failures = outcome.failures, "pull item will retry");
                            report.failed += 1;
                        }
                        Err(q) if q.is_permanent_failure() => {
                            error!(item_id = %item.id, mapping = %item.name, op = %item.op, error = %q, "pull item dropped");
                            self.ctx
                                .notify(SyncEvent::notice(NoticeLevel::Error, q.to_string()));
                            report.dropped += 1;
                        }
                        Err(q) => return Err(q.into()),
                    }
                }
            }
        }
        Ok(())
    }
}
