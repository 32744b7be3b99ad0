//! Transfer strategies
//!
//! A transfer moves the bytes of one item to the document store and returns
//! the server-confirmed document. Two strategies exist:
//!
//! - [`simple`] - One multipart request; cannot resume mid-flight
//! - [`session`] - The resumable chunked session protocol
//!
//! Strategies never touch the queue. They report progress and session
//! changes as [`TransferEvent`]s and their outcome as a `Result`; the queue
//! driver applies both to the item.

pub mod session;
pub mod simple;

use std::future::Future;
use std::sync::Arc;

use docupload_core::domain::{ConflictMode, IdempotencyKey, ItemId, SessionInfo, TransferMode};
use docupload_core::ports::{ByteSource, Document, DocumentStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// Notification from a running transfer to its driver
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Cumulative bytes sent or acknowledged; never decreases within a run
    Progress(u64),
    /// Offset confirmed by the server; may be lower than local progress
    Reconciled(u64),
    /// A session was created and must be kept for resume
    SessionAssigned(SessionInfo),
    /// The stored session expired and was discarded
    SessionCleared,
}

/// Everything a strategy needs for one run
///
/// Built by the queue at admission time from the item's current state.
pub struct TransferContext {
    /// Item being transferred, for logging
    pub item_id: ItemId,
    /// Bytes to upload
    pub source: Arc<dyn ByteSource>,
    /// Remote document store
    pub store: Arc<dyn DocumentStore>,
    /// Deduplication token sent with every request of this logical upload
    pub idempotency_key: IdempotencyKey,
    /// Resolution chosen after a conflict
    pub conflict_mode: Option<ConflictMode>,
    /// Metadata forwarded to the server
    pub run_options: Option<serde_json::Value>,
    /// Session from an earlier run, if any
    pub session: Option<SessionInfo>,
    /// Raised by pause, cancel and remove
    pub cancel: CancellationToken,
    /// Event channel to the driver
    pub events: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferContext {
    /// Sends an event to the driver; a closed channel is ignored
    pub(crate) fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }

    /// Fails fast with `Aborted` once cancellation was requested
    pub(crate) fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Aborted);
        }
        Ok(())
    }

    /// Runs `fut` unless cancellation is requested first
    ///
    /// The future is dropped as soon as the token fires, abandoning any
    /// in-flight request.
    pub(crate) async fn abortable<F: Future>(&self, fut: F) -> Result<F::Output, TransferError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransferError::Aborted),
            output = fut => Ok(output),
        }
    }
}

/// Runs the strategy for `mode`
pub async fn run(mode: TransferMode, ctx: TransferContext) -> Result<Document, TransferError> {
    match mode {
        TransferMode::Simple => simple::run_simple(&ctx).await,
        TransferMode::Session => session::run_session(&ctx).await,
    }
}
