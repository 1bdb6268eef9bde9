//! # API-Sync Queue
//!
//! Lease-based work queue used by the push and pull pipelines.
//!
//! This crate provides:
//! - The [`QueueStore`] contract (create, merge, claim, delete, release, fail)
//! - [`MemoryQueue`], an in-process store
//! - [`JournalQueue`], a file-backed store shared safely between processes
//! - [`QueueConfig`] and [`BackoffPolicy`] for the failure ceiling and retry delays
//!
//! ## Key Invariants
//!
//! - A claimed item is invisible to other claimants until its lease lapses
//!   or it is released
//! - Claims are atomic: two claimants never receive the same item
//! - Failure counts only grow; reaching the ceiling removes the item
//! - Nothing is dropped silently: an unacknowledged claim always becomes
//!   reclaimable once its lease expires

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod journal;
mod memory;
mod state;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackoffPolicy, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use journal::{CompactStats, JournalQueue, JournalRecord};
pub use memory::MemoryQueue;
pub use store::{ClaimRequest, FailOutcome, QueueStore};
