//! Error types for queue stores.

use apisync_protocol::{ItemId, ProtocolError};
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by queue stores.
#[derive(Error, Debug)]
pub enum QueueError {
    /// I/O error from the journal file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a journal record failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The item does not exist (already deleted or never created).
    #[error("queue item {0} not found")]
    ItemNotFound(ItemId),

    /// The item failed too many times and was removed.
    #[error("queue item {id} dropped after {failures} failures: {message}")]
    FailureLimitReached {
        /// The removed item.
        id: ItemId,
        /// Failure count at removal.
        failures: u32,
        /// The last error.
        message: String,
    },

    /// The journal is damaged before its tail.
    #[error("journal corrupted at offset {offset}: {message}")]
    Corrupt {
        /// Byte offset of the bad frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },
}

impl QueueError {
    /// Creates a corruption error.
    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if this error marks a permanently dropped item.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(self, QueueError::FailureLimitReached { .. })
    }
}
