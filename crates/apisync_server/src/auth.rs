//! Cron key validation.
//!
//! The configured key is never compared byte by byte. Both sides are run
//! through HMAC-SHA256 under a key derived from the configured secret and
//! the tags are compared in constant time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Checks the shared secret sent to the standalone endpoints.
#[derive(Clone)]
pub struct CronKeyValidator {
    mac_key: [u8; 32],
    expected_tag: Option<Vec<u8>>,
}

impl CronKeyValidator {
    /// Creates a validator. An empty key rejects every request.
    pub fn new(cron_key: &str) -> Self {
        let mac_key: [u8; 32] = Sha256::digest(cron_key.as_bytes()).into();
        let expected_tag = if cron_key.is_empty() {
            None
        } else {
            tag(&mac_key, cron_key.as_bytes())
        };
        Self {
            mac_key,
            expected_tag,
        }
    }

    /// Returns true if `provided` matches the configured key.
    pub fn validate(&self, provided: &str) -> bool {
        let Some(expected) = &self.expected_tag else {
            return false;
        };
        match HmacSha256::new_from_slice(&self.mac_key) {
            Ok(mut mac) => {
                mac.update(provided.as_bytes());
                mac.verify_slice(expected).is_ok()
            }
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for CronKeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronKeyValidator")
            .field("enabled", &self.expected_tag.is_some())
            .finish()
    }
}

fn tag(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(data);
    Some(mac.finalize().into_bytes().to_vec())
}
