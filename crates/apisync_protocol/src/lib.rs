//! # API-Sync Protocol
//!
//! Data model shared by the API-Sync queue store and engine.
//!
//! This crate provides:
//! - Identifier newtypes (mapping names, entity ids, remote ids, item ids)
//! - Queue items and their push/pull operation kinds
//! - Mappings and their field correspondences
//! - Mapped objects (the local ↔ remote correlation record)
//! - Remote records and the pull query builder
//! - CBOR encoding helpers used by durable stores
//!
//! Nothing here performs I/O. Stores and collaborators live in
//! `apisync_queue` and `apisync_engine`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod ids;
mod item;
mod mapped_object;
mod mapping;
mod query;
mod record;

pub use codec::{from_cbor, to_cbor};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{EntityId, ItemId, MappedObjectId, MappingId, RemoteId};
pub use item::{ItemOp, NewItem, PullOp, PushOp, QueueItem};
pub use mapped_object::{MappedObject, SyncAction};
pub use mapping::{Direction, FieldMapping, Mapping, SyncTriggers};
pub use query::{FinalizedQuery, PullQuery};
pub use record::{Entity, FieldMap, RemoteRecord};
