//! Remote transport and credential abstractions.

use crate::error::SyncResult;
use apisync_protocol::{FieldMap, FinalizedQuery, RemoteId, RemoteRecord};
use std::collections::BTreeSet;

/// A remote transport talks to the remote API.
///
/// Implementations map transport failures onto [`SyncError`](crate::SyncError):
/// expired credentials become `AuthUnavailable`, everything else `Remote`
/// with the appropriate retryable flag.
pub trait RemoteTransport: Send + Sync {
    /// Creates a record and returns its id.
    fn create(&self, object_type: &str, fields: &FieldMap) -> SyncResult<RemoteId>;

    /// Updates an existing record.
    fn update(&self, object_type: &str, id: &RemoteId, fields: &FieldMap) -> SyncResult<()>;

    /// Deletes a record.
    fn delete(&self, object_type: &str, id: &RemoteId) -> SyncResult<()>;

    /// Runs a pull query.
    fn query(&self, query: &FinalizedQuery) -> SyncResult<Vec<RemoteRecord>>;

    /// Fetches one record by id. `Ok(None)` if it does not exist.
    fn retrieve(
        &self,
        object_type: &str,
        id: &RemoteId,
        fields: &BTreeSet<String>,
    ) -> SyncResult<Option<RemoteRecord>>;

    /// Ids of records deleted after `since`.
    fn deleted_since(&self, object_type: &str, since: u64) -> SyncResult<Vec<RemoteId>>;
}

/// Supplies the remote access token.
pub trait TokenProvider: Send + Sync {
    /// Returns the current token, or `None` if no valid token is available.
    fn token(&self) -> Option<String>;
}
