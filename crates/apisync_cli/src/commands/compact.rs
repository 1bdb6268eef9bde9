//! Compact command implementation.

use super::{open_journal, ConfigSource};
use apisync_queue::{JournalRecord, QueueStore};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, source: &ConfigSource, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_journal(path, source)?;

    println!("Compacting journal at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let records = queue.records()?;
    let removes = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Remove(_)))
        .count();
    let live = queue.number_of_items()?;

    println!("Compaction Analysis:");
    println!("  Input records:  {}", records.len());
    println!("  Remove records: {}", removes);
    println!("  Live items:     {}", live);

    if dry_run {
        return Ok(());
    }
    if records.len() <= live {
        println!();
        println!("No compaction needed - journal is already minimal");
        return Ok(());
    }

    let stats = queue.compact()?;
    println!();
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!("✓ Compaction complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apisync_protocol::{NewItem, PushOp};
    use apisync_queue::{BackoffPolicy, JournalQueue, QueueConfig};

    fn journal(path: &Path) -> JournalQueue {
        let queue = JournalQueue::open(path, QueueConfig::new(3, BackoffPolicy::none())).unwrap();
        for entity in 1..=4u64 {
            let id = queue
                .create_item(NewItem::push("contact", entity, PushOp::Create))
                .unwrap();
            if entity % 2 == 0 {
                queue.delete_item(id).unwrap();
            }
        }
        queue
    }

    #[test]
    fn dry_run_leaves_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.journal");
        let queue = journal(&path);
        run(&path, &ConfigSource::default(), true).unwrap();
        assert_eq!(queue.records().unwrap().len(), 6);
    }

    #[test]
    fn compaction_shrinks_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.journal");
        let queue = journal(&path);
        run(&path, &ConfigSource::default(), false).unwrap();
        assert_eq!(queue.records().unwrap().len(), 2);
        assert_eq!(queue.number_of_items().unwrap(), 2);
    }
}
