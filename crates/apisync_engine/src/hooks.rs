//! Extension points consulted by the push and pull pipelines.

use apisync_protocol::{MappedObject, Mapping, PullQuery, QueueItem};

/// Alters a pull query before it is finalized.
///
/// Each registered hook receives the query by value and returns it,
/// typically with extra selected fields.
pub trait QueryAlter: Send + Sync {
    /// Returns the altered query.
    fn alter(&self, mapping: &Mapping, query: PullQuery) -> PullQuery;
}

/// Verdict of a [`PushGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushVerdict {
    /// Proceed with the push.
    Allow,
    /// Skip the push. The queue item is deleted.
    Veto(String),
}

/// Business-rule check run before each remote push operation.
pub trait PushGuard: Send + Sync {
    /// Decides whether `item` may be pushed.
    fn check(&self, mapping: &Mapping, item: &QueueItem, object: &MappedObject) -> PushVerdict;
}
