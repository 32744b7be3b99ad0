//! docupload Engine - Resumable upload engine
//!
//! Provides:
//! - A FIFO upload queue with a global concurrency bound
//! - Simple (single request) and session (chunked, resumable) transfer strategies
//! - Cooperative pause and cancel through per-item cancellation tokens
//! - Throttled progress reporting and a queue-wide progress summary
//!
//! ## Modules
//!
//! - [`queue`] - [`UploadQueue`](queue::UploadQueue), the scheduler owning every item
//! - [`transfer`] - Transfer strategies and the session protocol client
//! - [`throttle`] - Per-item progress coalescing
//! - [`aggregator`] - Pure summary over the item set
//! - [`config`] - Engine settings derived from the YAML configuration

pub mod aggregator;
pub mod config;
pub mod queue;
pub mod throttle;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{summarize, ProgressSummary, StatusCounts};
pub use config::EngineConfig;
pub use queue::{QueueSnapshot, UploadQueue};

use docupload_core::ports::StoreError;
use thiserror::Error;

/// Outcome classification of a failed transfer attempt
///
/// The queue driver maps each variant onto an item transition; none of them
/// escapes the queue's public operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Stopped by a pause, cancel or remove request
    #[error("Transfer aborted")]
    Aborted,

    /// The server reported a naming collision
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network, server or source failure; retryable by the user
    #[error("{0}")]
    Failed(String),

    /// The server answered with a malformed or incomplete response
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => TransferError::Conflict(message),
            StoreError::InvalidResponse(message) => TransferError::Protocol(message),
            other => TransferError::Failed(other.to_string()),
        }
    }
}
