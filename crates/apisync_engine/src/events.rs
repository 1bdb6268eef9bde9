//! Notification events and sinks.
//!
//! The engine publishes a [`SyncEvent`] before each remote operation, after
//! each success or failure, and around every drain pass. Sinks are
//! fire-and-forget: they cannot fail the pipeline.

use apisync_protocol::{EntityId, ItemId, ItemOp, MappingId, RemoteId};
use parking_lot::RwLock;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Severity of a free-form notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Informational.
    Notice,
    /// Something was skipped or degraded.
    Warning,
    /// Something failed.
    Error,
}

/// An event published by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// About to contact the remote for a push item.
    PushBefore {
        /// Mapping.
        mapping: MappingId,
        /// Queue item.
        item_id: ItemId,
        /// Operation.
        op: ItemOp,
        /// Local entity, when known.
        entity_id: Option<EntityId>,
    },
    /// About to apply a pulled record locally.
    PullBefore {
        /// Mapping.
        mapping: MappingId,
        /// Queue item.
        item_id: ItemId,
        /// Operation.
        op: ItemOp,
        /// Remote record.
        remote_id: RemoteId,
    },
    /// An item was synchronized.
    Success {
        /// Mapping.
        mapping: MappingId,
        /// Queue item.
        item_id: ItemId,
        /// Operation.
        op: ItemOp,
        /// Remote record, when known.
        remote_id: Option<RemoteId>,
    },
    /// An item failed.
    Failure {
        /// Mapping.
        mapping: MappingId,
        /// Queue item.
        item_id: ItemId,
        /// Operation.
        op: ItemOp,
        /// Error message.
        message: String,
    },
    /// A drain pass is starting.
    DrainStarted {
        /// Items in the queue at start.
        queued: usize,
    },
    /// A drain pass ended.
    DrainFinished {
        /// Items processed.
        count: usize,
        /// Wall time of the pass.
        elapsed: Duration,
    },
    /// Free-form message.
    Notice {
        /// Severity.
        level: NoticeLevel,
        /// Message.
        message: String,
    },
}

impl SyncEvent {
    /// Creates a notice.
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::Notice {
            level,
            message: message.into(),
        }
    }
}

/// Receives engine events.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must not block for long.
    fn notify(&self, event: &SyncEvent);
}

/// Fans events out to every subscribed sink.
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    /// Creates a bus with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that forwards to `tracing`.
    pub fn with_tracing() -> Self {
        let bus = Self::new();
        bus.subscribe(Arc::new(TracingSink));
        bus
    }

    /// Adds a sink.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Number of subscribed sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Delivers an event to every sink.
    pub fn publish(&self, event: SyncEvent) {
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.notify(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sink_count())
            .finish()
    }
}

/// Writes events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, event: &SyncEvent) {
        match event {
            SyncEvent::PushBefore {
                mapping,
                item_id,
                op,
                ..
            }
            | SyncEvent::PullBefore {
                mapping,
                item_id,
                op,
                ..
            } => debug!(%mapping, %item_id, %op, "sync starting"),
            SyncEvent::Success {
                mapping,
                item_id,
                op,
                remote_id,
            } => info!(%mapping, %item_id, %op, remote_id = ?remote_id, "sync succeeded"),
            SyncEvent::Failure {
                mapping,
                item_id,
                op,
                message,
            } => warn!(%mapping, %item_id, %op, error = %message, "sync failed"),
            SyncEvent::DrainStarted { queued } => debug!(queued, "drain pass starting"),
            SyncEvent::DrainFinished { count, elapsed } => {
                info!(count, elapsed_ms = elapsed.as_millis() as u64, "drain pass finished")
            }
            SyncEvent::Notice { level, message } => match level {
                NoticeLevel::Notice => info!("{message}"),
                NoticeLevel::Warning => warn!("{message}"),
                NoticeLevel::Error => error!("{message}"),
            },
        }
    }
}

/// Forwards events into an mpsc channel. A closed receiver is ignored.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<SyncEvent>,
}

impl ChannelSink {
    /// Wraps a channel sender.
    pub fn new(sender: Sender<SyncEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn notify(&self, event: &SyncEvent) {
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn bus_fans_out() {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        let bus = EventBus::new();
        bus.subscribe(Arc::new(ChannelSink::new(tx_a)));
        bus.subscribe(Arc::new(ChannelSink::new(tx_b)));

        bus.publish(SyncEvent::DrainStarted { queued: 3 });

        assert_eq!(rx_a.try_recv().unwrap(), SyncEvent::DrainStarted { queued: 3 });
        assert_eq!(rx_b.try_recv().unwrap(), SyncEvent::DrainStarted { queued: 3 });
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let bus = EventBus::with_tracing();
        bus.subscribe(Arc::new(ChannelSink::new(tx)));
        bus.publish(SyncEvent::notice(NoticeLevel::Warning, "no receiver"));
        assert_eq!(bus.sink_count(), 2);
    }
}
