//! Endpoint configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the standalone endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shared secret expected on every request. Empty disables the endpoints.
    pub cron_key: String,
    /// Allow pulling every standalone mapping when no mapping is named.
    pub standalone_pull: bool,
    /// Allow pushing every mapping when no mapping is named.
    pub standalone_push: bool,
}

impl ServerConfig {
    /// Creates a configuration with the given cron key and both global
    /// standalone switches off.
    pub fn new(cron_key: impl Into<String>) -> Self {
        Self {
            cron_key: cron_key.into(),
            standalone_pull: false,
            standalone_push: false,
        }
    }

    /// Enables or disables global standalone pull.
    pub fn with_standalone_pull(mut self, enabled: bool) -> Self {
        self.standalone_pull = enabled;
        self
    }

    /// Enables or disables global standalone push.
    pub fn with_standalone_push(mut self, enabled: bool) -> Self {
        self.standalone_push = enabled;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("key").with_standalone_pull(true);
        assert_eq!(config.cron_key, "key");
        assert!(config.standalone_pull);
        assert!(!config.standalone_push);
    }

    #[test]
    fn config_from_json() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"cron_key": "k", "standalone_push": true}"#).unwrap();
        assert_eq!(config, ServerConfig::new("k").with_standalone_push(true));
    }
}
