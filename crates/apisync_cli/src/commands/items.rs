//! Single-item maintenance: release and delete.

use super::{open_journal, ConfigSource};
use apisync_protocol::ItemId;
use apisync_queue::QueueStore;
use std::path::Path;
use tracing::info;

/// Clears the lease on an item so it can be claimed again.
pub fn release(path: &Path, source: &ConfigSource, id: u64) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_journal(path, source)?;
    queue.release_item(ItemId(id))?;
    info!(item = id, "item released");
    println!("✓ Released item {}", id);
    Ok(())
}

/// Removes an item from the queue.
pub fn delete(path: &Path, source: &ConfigSource, id: u64) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_journal(path, source)?;
    queue.delete_item(ItemId(id))?;
    info!(item = id, "item deleted");
    println!("✓ Deleted item {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apisync_protocol::{NewItem, PushOp};
    use apisync_queue::{BackoffPolicy, ClaimRequest, JournalQueue, QueueConfig};
    use std::time::Duration;

    #[test]
    fn release_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.journal");
        let queue = JournalQueue::open(&path, QueueConfig::new(3, BackoffPolicy::none())).unwrap();
        let id = queue
            .create_item(NewItem::push("contact", 1u64, PushOp::Create))
            .unwrap();
        assert_eq!(queue.claim(&ClaimRequest::new(Duration::from_secs(600))).unwrap().len(), 1);

        release(&path, &ConfigSource::default(), id.0).unwrap();
        assert_eq!(queue.get_item(id).unwrap().unwrap().expire, 0);

        delete(&path, &ConfigSource::default(), id.0).unwrap();
        assert_eq!(queue.number_of_items().unwrap(), 0);
    }
}
