//! Dump command implementation.

use super::{open_journal, ConfigSource};
use apisync_queue::JournalRecord;
use std::path::Path;

/// Runs the dump command.
pub fn run(
    path: &Path,
    source: &ConfigSource,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_journal(path, source)?;
    let mut records = queue.records()?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn describe(record: &JournalRecord) -> String {
    match record {
        JournalRecord::Put(item) => format!(
            "PUT     id={} mapping={} op={} failures={} expire={}",
            item.id, item.name, item.op, item.failures, item.expire
        ),
        JournalRecord::Remove(id) => format!("REMOVE  id={}", id),
    }
}

fn print_text_output(records: &[JournalRecord]) {
    println!("Journal Records ({} total)", records.len());
    println!("{}", "-".repeat(72));
    for (i, record) in records.iter().enumerate() {
        println!("[{:>6}] {}", i, describe(record));
    }
}
