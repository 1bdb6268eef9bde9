//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod gc;
pub mod inspect;
pub mod items;

use apisync_queue::{BackoffPolicy, JournalQueue, QueueConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the queue configuration comes from.
#[derive(Debug, Default)]
pub struct ConfigSource {
    /// JSON file holding a `QueueConfig`.
    pub file: Option<PathBuf>,
    /// Ceiling override.
    pub max_failures: Option<u32>,
}

impl ConfigSource {
    /// Resolves the configuration, or `None` when neither a file nor a
    /// ceiling was given.
    pub fn resolve(&self) -> Result<Option<QueueConfig>, Box<dyn std::error::Error>> {
        let mut config = match &self.file {
            Some(file) => Some(serde_json::from_str::<QueueConfig>(&fs::read_to_string(file)?)?),
            None => None,
        };
        if let Some(max_failures) = self.max_failures {
            config = Some(match config {
                Some(config) => config.with_max_failures(max_failures),
                None => QueueConfig::new(max_failures, BackoffPolicy::none()),
            });
        }
        Ok(config)
    }
}

/// Opens a journal that must already exist.
///
/// Commands that never fail items run without a configured ceiling.
pub fn open_journal(
    path: &Path,
    source: &ConfigSource,
) -> Result<JournalQueue, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {:?}", path).into());
    }
    let config = source
        .resolve()?
        .unwrap_or_else(|| QueueConfig::new(u32::MAX, BackoffPolicy::none()));
    Ok(JournalQueue::open(path, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ceiling_override_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_failures": 5, "backoff": {{"initial_delay": 10, "max_delay": 60, "multiplier": 2.0}}}}"#
        )
        .unwrap();

        let source = ConfigSource {
            file: Some(file.path().to_path_buf()),
            max_failures: None,
        };
        assert_eq!(source.resolve().unwrap().unwrap().max_failures, 5);

        let source = ConfigSource {
            file: Some(file.path().to_path_buf()),
            max_failures: Some(2),
        };
        let config = source.resolve().unwrap().unwrap();
        assert_eq!(config.max_failures, 2);
        assert_eq!(config.backoff.max_delay.as_secs(), 60);
    }

    #[test]
    fn nothing_configured() {
        assert!(ConfigSource::default().resolve().unwrap().is_none());
    }

    #[test]
    fn missing_journal_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_journal(&dir.path().join("absent.journal"), &ConfigSource::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("No journal found"));
    }
}
