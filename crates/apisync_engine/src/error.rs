//! Error types for the sync engine.

use apisync_protocol::{EntityId, MappingId, ProtocolError};
use apisync_queue::QueueError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while pushing or pulling.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local entity referenced by an item no longer exists.
    #[error("{entity_type} entity {entity_id} not found")]
    EntityNotFound {
        /// Entity type.
        entity_type: String,
        /// Entity id.
        entity_id: EntityId,
    },

    /// No valid remote token. Suspends the whole batch.
    #[error("remote authentication unavailable")]
    AuthUnavailable,

    /// A remote create, update, delete or query failed.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The item names a mapping that does not exist.
    #[error("mapping {0} not found")]
    MappingNotFound(MappingId),

    /// Saving a mapped object collided with the uniqueness constraint.
    #[error("duplicate mapped object for mapping {mapping}: {message}")]
    DuplicateMapping {
        /// Mapping.
        mapping: MappingId,
        /// Which key collided.
        message: String,
    },

    /// A collaborator is temporarily busy. The item is released untouched.
    #[error("busy: {0}")]
    Busy(String),

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Entity or mapped-object storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Queue store error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Data model error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the item may succeed on a later attempt.
    ///
    /// Retryable failures go through the queue's failure ceiling;
    /// the rest drop the item straight away.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::EntityNotFound { .. }
            | SyncError::DuplicateMapping { .. }
            | SyncError::Busy(_)
            | SyncError::Storage(_)
            | SyncError::AuthUnavailable => true,
            SyncError::Queue(e) => !e.is_permanent_failure(),
            _ => false,
        }
    }

    /// Returns true if the whole pass must stop.
    pub fn is_suspend(&self) -> bool {
        matches!(self, SyncError::AuthUnavailable)
    }

    /// Returns true if the item should be released without counting a failure.
    pub fn is_requeue(&self) -> bool {
        matches!(self, SyncError::DuplicateMapping { .. } | SyncError::Busy(_))
    }
}
