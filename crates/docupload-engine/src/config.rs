//! Engine settings
//!
//! [`EngineConfig`] is the runtime view of the `upload` configuration
//! section: byte counts instead of MiB and `Duration`s instead of raw
//! milliseconds.

use std::time::Duration;

use docupload_core::config::Config;

/// Settings of one [`UploadQueue`](crate::queue::UploadQueue)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of items in `uploading` at the same time (at least 1)
    pub concurrency: usize,
    /// Sources of at least this many bytes use the session strategy
    pub session_threshold: u64,
    /// Minimum time between two progress publications of one item
    pub progress_interval: Duration,
}

impl EngineConfig {
    /// Returns a copy with `concurrency` overridden
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.upload.concurrency.max(1),
            session_threshold: config.session_threshold_bytes(),
            progress_interval: Duration::from_millis(config.upload.progress_interval_ms),
        }
    }
}
