//! Error types for the standalone endpoints.

use apisync_engine::SyncError;
use apisync_protocol::MappingId;
use thiserror::Error;

/// Result type for endpoint operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while handling a standalone request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Bad cron key, or standalone processing disabled for the scope.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested mapping does not exist.
    #[error("unknown mapping: {0}")]
    MappingNotFound(MappingId),

    /// Populate, drain or push failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl ServerError {
    /// Returns true if the caller is at fault (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Forbidden(_) | ServerError::MappingNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::Forbidden("bad key".into()).is_client_error());
        assert!(ServerError::MappingNotFound("x".into()).is_client_error());
        assert!(!ServerError::Sync(SyncError::AuthUnavailable).is_client_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::MappingNotFound("contact".into());
        assert_eq!(err.to_string(), "unknown mapping: contact");
    }
}
