//! Transfer tuning knobs.

use std::path::Path;
use std::time::Duration;

use ftpflow_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DRAIN_TIMEOUT, DEFAULT_REPLY_TIMEOUT, DEFAULT_RETRY_ATTEMPTS,
};
use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Settings shared by every transfer a [`TransferClient`](crate::TransferClient) runs.
///
/// Deserializes from camelCase JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferConfig {
    /// Bytes per read/write when no rate limit applies.
    pub chunk_size: usize,
    /// Upload cap in bytes per second, 0 for unlimited.
    pub upload_rate_limit: u64,
    /// Download cap in bytes per second, 0 for unlimited.
    pub download_rate_limit: u64,
    /// Interval between keep-alives during a transfer, 0 disables them.
    pub noop_interval_ms: u64,
    /// Attempts per file when verification asks for retries.
    pub retry_attempts: u32,
    pub drain_timeout_ms: u64,
    pub reply_timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_rate_limit: 0,
            download_rate_limit: 0,
            noop_interval_ms: 0,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT.as_millis() as u64,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TransferConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, TransferError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::Argument("chunk size must be positive".into()));
        }
        if self.retry_attempts == 0 {
            return Err(TransferError::Argument(
                "at least one transfer attempt is required".into(),
            ));
        }
        Ok(())
    }

    pub fn noop_interval(&self) -> Option<Duration> {
        (self.noop_interval_ms > 0).then(|| Duration::from_millis(self.noop_interval_ms))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.drain_timeout(), Duration::from_secs(10));
        assert_eq!(config.reply_timeout(), Duration::from_secs(30));
        assert!(config.noop_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            TransferConfig::from_json(r#"{"uploadRateLimit": 2048, "noopIntervalMs": 500}"#)
                .unwrap();
        assert_eq!(config.upload_rate_limit, 2048);
        assert_eq!(config.noop_interval(), Some(Duration::from_millis(500)));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn rejects_zero_chunk() {
        let err = TransferConfig::from_json(r#"{"chunkSize": 0}"#).unwrap_err();
        assert!(matches!(err, TransferError::Argument(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = TransferConfig::from_json("{").unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfer.json");
        std::fs::write(&path, r#"{"retryAttempts": 5}"#).unwrap();
        assert_eq!(TransferConfig::load(&path).unwrap().retry_attempts, 5);
    }
}
