use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a preference store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the store directory
    pub path: PathBuf,

    /// Serialize editors with a single blocking permit (default: true)
    ///
    /// When enabled, `begin_edit` from a second thread blocks until the
    /// current editor commits. When disabled, a concurrent edit attempt
    /// fails immediately instead of waiting.
    #[serde(default = "default_true")]
    pub thread_safe: bool,

    /// Engine write buffer size in bytes (default: 64 KiB)
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Engine block cache size in bytes (default: 64 KiB)
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,

    /// Maximum number of files the engine keeps open (default: 50)
    #[serde(default = "default_max_open_files")]
    pub max_open_files: u32,

    /// Sleep between open attempts when the engine reports a transient
    /// "Try again" failure (default: 100ms)
    #[serde(default = "default_open_retry_interval")]
    pub open_retry_interval_ms: u64,

    /// Total time budget for transient open retries (default: 5000ms)
    ///
    /// Once exceeded, the open falls through to the repair-and-reopen
    /// salvage path.
    #[serde(default = "default_open_retry_max_wait")]
    pub open_retry_max_wait_ms: u64,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            thread_safe: default_true(),
            write_buffer_size: default_write_buffer_size(),
            block_cache_size: default_block_cache_size(),
            max_open_files: default_max_open_files(),
            open_retry_interval_ms: default_open_retry_interval(),
            open_retry_max_wait_ms: default_open_retry_max_wait(),
        }
    }

    pub fn with_thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_block_cache_size(mut self, size: usize) -> Self {
        self.block_cache_size = size;
        self
    }

    pub fn with_max_open_files(mut self, count: u32) -> Self {
        self.max_open_files = count;
        self
    }

    /// Set both open-retry knobs at once
    pub fn with_open_retry(mut self, interval_ms: u64, max_wait_ms: u64) -> Self {
        self.open_retry_interval_ms = interval_ms;
        self.open_retry_max_wait_ms = max_wait_ms;
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_write_buffer_size() -> usize {
    64 * 1024
}

fn default_block_cache_size() -> usize {
    64 * 1024
}

fn default_max_open_files() -> u32 {
    50
}

fn default_open_retry_interval() -> u64 {
    100
}

fn default_open_retry_max_wait() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_on_construction() {
        let config = StoreConfig::new("/tmp/prefs");
        assert!(config.thread_safe);
        assert_eq!(config.write_buffer_size, 64 * 1024);
        assert_eq!(config.max_open_files, 50);
        assert_eq!(config.open_retry_interval_ms, 100);
        assert_eq!(config.open_retry_max_wait_ms, 5000);
    }

    #[test]
    fn builders_override_defaults() {
        let config = StoreConfig::new("/tmp/prefs")
            .with_thread_safe(false)
            .with_write_buffer_size(1 << 20)
            .with_open_retry(10, 200);
        assert!(!config.thread_safe);
        assert_eq!(config.write_buffer_size, 1 << 20);
        assert_eq!(config.open_retry_interval_ms, 10);
        assert_eq!(config.open_retry_max_wait_ms, 200);
    }

    #[test]
    fn defaults_applied_on_deserialize() {
        let config: StoreConfig = serde_json::from_str(r#"{"path": "/tmp/prefs"}"#).unwrap();
        assert!(config.thread_safe);
        assert_eq!(config.block_cache_size, 64 * 1024);
        assert_eq!(config.open_retry_max_wait_ms, 5000);
    }
}
