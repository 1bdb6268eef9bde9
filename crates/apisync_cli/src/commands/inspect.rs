//! Inspect command implementation.

use super::{open_journal, ConfigSource};
use apisync_protocol::QueueItem;
use apisync_queue::QueueStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal size in bytes.
    pub size: u64,
    /// Records in the journal.
    pub record_count: usize,
    /// Live items.
    pub item_count: usize,
    /// Items currently leased.
    pub leased: usize,
    /// Items with at least one failure.
    pub failing: usize,
    /// Live items per mapping.
    pub per_mapping: BTreeMap<String, usize>,
    /// Every item (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<QueueItem>>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    source: &ConfigSource,
    show_items: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_journal(path, source)?;
    let items = queue.items()?;
    let result = summarize(path, &items, queue.records()?.len(), now_secs(), show_items)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn summarize(
    path: &Path,
    items: &[QueueItem],
    record_count: usize,
    now: u64,
    show_items: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut per_mapping = BTreeMap::new();
    for item in items {
        *per_mapping.entry(item.name.to_string()).or_insert(0) += 1;
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        size: std::fs::metadata(path)?.len(),
        record_count,
        item_count: items.len(),
        leased: items.iter().filter(|i| i.expire > now).count(),
        failing: items.iter().filter(|i| i.failures > 0).count(),
        per_mapping,
        items: show_items.then(|| items.to_vec()),
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn print_text_output(result: &InspectResult) {
    println!("Queue Journal: {}", result.path);
    println!();
    println!("Size:     {} bytes", result.size);
    println!("Records:  {}", result.record_count);
    println!();
    println!("Items:    {}", result.item_count);
    println!("  Leased:  {}", result.leased);
    println!("  Failing: {}", result.failing);

    if !result.per_mapping.is_empty() {
        println!();
        println!("Mappings:");
        for (mapping, count) in &result.per_mapping {
            println!("  {:<24} {}", mapping, count);
        }
    }

    if let Some(items) = &result.items {
        println!();
        println!("{:>8}  {:<16} {:<8} {:>8} {:>12}", "ID", "MAPPING", "OP", "FAILURES", "EXPIRE");
        for item in items {
            println!(
                "{:>8}  {:<16} {:<8} {:>8} {:>12}",
                item.id, item.name, item.op, item.failures, item.expire
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apisync_protocol::{ItemId, NewItem, PushOp};

    #[test]
    fn summary_counts() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut leased = QueueItem::from_new(ItemId(1), NewItem::push("contact", 1u64, PushOp::Create), 100);
        leased.expire = 500;
        let mut failing = QueueItem::from_new(ItemId(2), NewItem::push("contact", 2u64, PushOp::Update), 100);
        failing.failures = 2;
        let other = QueueItem::from_new(ItemId(3), NewItem::push("account", 3u64, PushOp::Delete), 100);

        let result = summarize(file.path(), &[leased, failing, other], 7, 200, false).unwrap();
        assert_eq!(result.item_count, 3);
        assert_eq!(result.record_count, 7);
        assert_eq!(result.leased, 1);
        assert_eq!(result.failing, 1);
        assert_eq!(result.per_mapping.get("contact"), Some(&2));
        assert_eq!(result.per_mapping.get("account"), Some(&1));
        assert!(result.items.is_none());
    }
}
