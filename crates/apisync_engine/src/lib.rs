//! # API-Sync Engine
//!
//! Push and pull queue processing between local entities and a remote API.
//!
//! This crate provides:
//! - Collaborator traits for entity storage, mapped-object storage,
//!   the remote transport and credentials
//! - The mapped-object resolver
//! - [`PushProcessor`] and the [`PushQueue`] runner
//! - [`PullQueue`]: populate from the remote, then drain through a [`PullWorker`]
//! - An event bus with tracing and channel sinks
//! - In-memory collaborators for tests and embedding
//!
//! ## Architecture
//!
//! Entity changes enqueue push items; the push runner claims them per
//! mapping and writes to the remote. A cron or on-demand trigger populates
//! the pull queue from remote changes and drains it inside a time budget.
//! Both directions share one [`SyncContext`] holding every collaborator.
//!
//! ## Key Invariants
//!
//! - A queue item is processed by at most one worker at a time
//! - Per-item failures never abort sibling items; only a suspend does
//! - At most one mapped object per (mapping, entity) and (mapping, remote id)
//! - A claimed item is always deleted, released or failed before the pass ends

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod events;
mod hooks;
mod mappings;
mod memory;
mod pull;
mod push;
mod resolver;
mod storage;
mod transport;

pub use config::{PullConfig, PushConfig};
pub use context::SyncContext;
pub use error::{SyncError, SyncResult};
pub use events::{ChannelSink, EventBus, EventSink, NoticeLevel, SyncEvent, TracingSink};
pub use hooks::{PushGuard, PushVerdict, QueryAlter};
pub use mappings::MappingRegistry;
pub use memory::{
    MemoryCheckpoints, MemoryEntityStorage, MemoryMappedObjects, MockRemote, RecordingSink,
    RemoteCall, StaticTokenProvider,
};
pub use pull::{DrainLimit, DrainReport, PullQueue, PullWorker, WorkerOutcome};
pub use push::{PushOutcome, PushProcessor, PushQueue, PushReport};
pub use resolver::MappedObjectResolver;
pub use storage::{CheckpointKind, CheckpointStore, EntityStorage, MappedObjectStore};
pub use transport::{RemoteTransport, TokenProvider};
