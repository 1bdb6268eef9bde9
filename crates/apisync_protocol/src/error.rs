//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or validating protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A value violated a structural rule.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Field or value that was rejected.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },
}

impl ProtocolError {
    /// Creates an [`ProtocolError::Invalid`] error.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
