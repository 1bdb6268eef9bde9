//! Garbage collection command implementation.

use super::ConfigSource;
use apisync_queue::{JournalQueue, QueueStore};
use std::path::Path;

/// Runs the gc command. Requires a failure ceiling.
pub fn run(path: &Path, source: &ConfigSource) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {:?}", path).into());
    }
    let config = source
        .resolve()?
        .ok_or("gc needs a failure ceiling: pass --config or --max-failures")?;

    let ceiling = config.ceiling();
    let queue = JournalQueue::open(path, config)?;
    let removed = queue.garbage_collect()?;
    println!("✓ Removed {} item(s) at or past {} failures", removed, ceiling);
    Ok(())
}
