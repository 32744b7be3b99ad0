//! UploadItem domain entity
//!
//! This module defines the UploadItem entity which represents one file
//! enqueued for upload to the document store, together with its lifecycle.
//!
//! ## State Machine
//!
//! ```text
//!                 admit                 complete
//!   ┌────────┐ ──────────► ┌───────────┐ ──────────► ┌───────────┐
//!   │ Queued │             │ Uploading │             │ Succeeded │
//!   └────────┘ ◄──┐        └───────────┘             └───────────┘
//!        ▲        │          │   │   │
//!        │ resume │    pause │   │   │ 409
//!        │        │          ▼   │   ▼
//!        │     ┌────────┐        │  ┌──────────┐
//!        │     │ Paused │        │  │ Conflict │──── resolve ───► Queued
//!        │     └────────┘        │  └──────────┘
//!        │                 error ▼
//!        │  retry          ┌────────┐
//!        └──────────────── │ Failed │
//!                          └────────┘
//!
//!   Queued | Uploading | Paused | Conflict | Failed ── cancel ──► Cancelled
//! ```
//!
//! `Succeeded` and `Cancelled` never transition again. `Failed` is terminal
//! for scheduling purposes but can be re-queued explicitly with `retry`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{IdempotencyKey, ItemId, UploadSessionId};

// ============================================================================
// UploadStatus enum
// ============================================================================

/// Lifecycle status of an upload item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Waiting for a concurrency slot
    #[default]
    Queued,
    /// A transfer is in flight
    Uploading,
    /// Stopped by the user; can be resumed
    Paused,
    /// The server reported a naming collision; needs a resolution choice
    Conflict,
    /// The server confirmed the document
    Succeeded,
    /// The transfer failed; can be retried
    Failed,
    /// Cancelled by the user
    Cancelled,
}

impl UploadStatus {
    /// Every status, in declaration order
    pub const ALL: [UploadStatus; 7] = [
        UploadStatus::Queued,
        UploadStatus::Uploading,
        UploadStatus::Paused,
        UploadStatus::Conflict,
        UploadStatus::Succeeded,
        UploadStatus::Failed,
        UploadStatus::Cancelled,
    ];

    /// Returns true if the item reached a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Succeeded | UploadStatus::Failed | UploadStatus::Cancelled
        )
    }

    /// Returns true if the item still counts as in flight for the summary
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            UploadStatus::Queued | UploadStatus::Uploading | UploadStatus::Paused
        )
    }

    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            UploadStatus::Queued => "queued",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Paused => "paused",
            UploadStatus::Conflict => "conflict",
            UploadStatus::Succeeded => "succeeded",
            UploadStatus::Failed => "failed",
            UploadStatus::Cancelled => "cancelled",
        }
    }

    /// Checks whether the lifecycle allows moving to `target`
    pub fn can_transition_to(&self, target: UploadStatus) -> bool {
        use UploadStatus::*;

        matches!(
            (self, target),
            (Queued, Uploading)
                | (Uploading, Paused)
                | (Uploading, Succeeded)
                | (Uploading, Failed)
                | (Uploading, Conflict)
                | (Uploading, Cancelled)
                | (Paused, Queued)
                | (Failed, Queued)
                | (Conflict, Queued)
                | (Queued, Cancelled)
                | (Paused, Cancelled)
                | (Conflict, Cancelled)
                | (Failed, Cancelled)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ConflictMode enum
// ============================================================================

/// How the server should treat a name that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Store the new document under a server-chosen unique name
    Rename,
    /// Overwrite the existing document
    Replace,
    /// Keep the existing document and drop the new one
    Skip,
}

impl ConflictMode {
    /// Wire representation of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictMode::Rename => "rename",
            ConflictMode::Replace => "replace",
            ConflictMode::Skip => "skip",
        }
    }
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rename" => Ok(ConflictMode::Rename),
            "replace" => Ok(ConflictMode::Replace),
            "skip" => Ok(ConflictMode::Skip),
            other => Err(DomainError::InvalidConflictMode(other.to_string())),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Byte progress of one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Bytes the server has acknowledged (or the transport has sent)
    pub loaded: u64,
    /// Total size of the source in bytes
    pub total: u64,
    /// `loaded / total` rounded to a whole percent, in `0..=100`
    pub percent: u8,
}

impl Progress {
    /// Creates zero progress for a source of `total` bytes
    pub fn new(total: u64) -> Self {
        Self {
            loaded: 0,
            total,
            percent: 0,
        }
    }

    /// Creates progress at `loaded` bytes, clamped to `total`
    pub fn at(loaded: u64, total: u64) -> Self {
        let loaded = loaded.min(total);
        Self {
            loaded,
            total,
            percent: percent_of(loaded, total),
        }
    }

    /// Progress pinned to completion
    pub fn complete(total: u64) -> Self {
        Self {
            loaded: total,
            total,
            percent: 100,
        }
    }

    /// Returns true if every byte is accounted for
    pub fn is_complete(&self) -> bool {
        self.loaded >= self.total
    }
}

/// Whole percent of `part` over `whole`, `0` when `whole` is zero
pub fn percent_of(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let ratio = part as f64 / whole as f64 * 100.0;
    ratio.min(100.0).round() as u8
}

// ============================================================================
// Transfer variants
// ============================================================================

/// Resumable session descriptor assigned by the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Server-assigned session identifier
    pub session_id: UploadSessionId,
    /// Maximum bytes per range request, dictated by the server
    pub chunk_size_bytes: u64,
    /// Ranges the server still expects, e.g. `["1048576-"]`
    pub next_expected_ranges: Vec<String>,
}

/// State carried by a session-mode transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTransfer {
    /// Absent until the first create call succeeds
    pub session: Option<SessionInfo>,
}

/// Which strategy moves the bytes of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// One multipart request for the whole file, no mid-flight resume
    Simple,
    /// Chunked resumable upload session
    Session,
}

impl TransferMode {
    /// Picks the mode for a source of `size` bytes
    ///
    /// Sources of at least `session_threshold` bytes use a session.
    pub fn for_size(size: u64, session_threshold: u64) -> Self {
        if size >= session_threshold {
            TransferMode::Session
        } else {
            TransferMode::Simple
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Simple => f.write_str("simple"),
            TransferMode::Session => f.write_str("session"),
        }
    }
}

/// Transfer strategy of an item, decided once at admission
///
/// The variant never changes after it is set; only the session descriptor
/// inside [`Transfer::Session`] is updated as the protocol progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Transfer {
    /// Single-request transfer
    Simple,
    /// Resumable chunked transfer
    Session(SessionTransfer),
}

impl Transfer {
    /// Creates an empty transfer for the given mode
    pub fn for_mode(mode: TransferMode) -> Self {
        match mode {
            TransferMode::Simple => Transfer::Simple,
            TransferMode::Session => Transfer::Session(SessionTransfer::default()),
        }
    }

    /// Returns the mode of this transfer
    pub fn mode(&self) -> TransferMode {
        match self {
            Transfer::Simple => TransferMode::Simple,
            Transfer::Session(_) => TransferMode::Session,
        }
    }

    /// Returns the session descriptor, if one was assigned
    pub fn session(&self) -> Option<&SessionInfo> {
        match self {
            Transfer::Simple => None,
            Transfer::Session(s) => s.session.as_ref(),
        }
    }
}

// ============================================================================
// SourceInfo
// ============================================================================

/// Descriptor of the bytes behind an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// File name sent to the server
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// MIME type sent to the server
    pub content_type: String,
}

// ============================================================================
// UploadItem struct
// ============================================================================

/// One file enqueued for upload
///
/// Mutated only through the lifecycle methods below; each one validates the
/// transition and returns `DomainError::InvalidState` when it is not allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    /// Engine-local identifier
    id: ItemId,
    /// Deduplication token for the server
    idempotency_key: IdempotencyKey,
    /// Name, size and content type of the source
    source: SourceInfo,
    /// Current lifecycle status
    status: UploadStatus,
    /// Transfer strategy; `None` until first admitted
    transfer: Option<Transfer>,
    /// Byte progress
    progress: Progress,
    /// Resolution chosen for a naming conflict
    conflict_mode: Option<ConflictMode>,
    /// Last human-readable failure reason
    error: Option<String>,
    /// Server-confirmed document, present only when succeeded
    response: Option<serde_json::Value>,
    /// Metadata forwarded to the server with the upload
    run_options: Option<serde_json::Value>,
    /// When the item was enqueued
    created_at: DateTime<Utc>,
    /// When the item last changed status
    updated_at: DateTime<Utc>,
}

impl UploadItem {
    /// Creates a new queued item
    pub fn new(id: ItemId, source: SourceInfo, run_options: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            idempotency_key: IdempotencyKey::new(),
            progress: Progress::new(source.size),
            source,
            status: UploadStatus::Queued,
            transfer: None,
            conflict_mode: None,
            error: None,
            response: None,
            run_options,
            created_at: now,
            updated_at: now,
        }
    }

    // ------------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------------

    /// Returns the item ID
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Returns the idempotency key
    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.idempotency_key
    }

    /// Returns the source descriptor
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Returns the current status
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Returns the transfer, if the item was ever admitted
    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    /// Returns the transfer mode, if decided
    pub fn mode(&self) -> Option<TransferMode> {
        self.transfer.as_ref().map(Transfer::mode)
    }

    /// Returns the session descriptor, if one was assigned
    pub fn session(&self) -> Option<&SessionInfo> {
        self.transfer.as_ref().and_then(Transfer::session)
    }

    /// Returns the byte progress
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Returns the chosen conflict resolution
    pub fn conflict_mode(&self) -> Option<ConflictMode> {
        self.conflict_mode
    }

    /// Returns the last failure reason
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the server-confirmed document
    pub fn response(&self) -> Option<&serde_json::Value> {
        self.response.as_ref()
    }

    /// Returns the run options forwarded with the upload
    pub fn run_options(&self) -> Option<&serde_json::Value> {
        self.run_options.as_ref()
    }

    /// Returns when the item was enqueued
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the item last changed status
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ------------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------------

    /// Moves to `target` if the lifecycle allows it
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: UploadStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Admits a queued item into transfer
    ///
    /// Decides the transfer mode on first admission; later admissions keep
    /// the existing variant (and its session, if any).
    pub fn admit(&mut self, session_threshold: u64) -> Result<TransferMode, DomainError> {
        self.transition_to(UploadStatus::Uploading)?;
        let transfer = self.transfer.get_or_insert_with(|| {
            Transfer::for_mode(TransferMode::for_size(self.source.size, session_threshold))
        });
        Ok(transfer.mode())
    }

    /// Pauses an in-flight transfer
    ///
    /// Session-mode progress is kept until the server status reconciles it;
    /// simple-mode transfers restart from zero.
    pub fn pause(&mut self) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Paused)?;
        if matches!(self.transfer, Some(Transfer::Simple)) {
            self.progress = Progress::new(self.source.size);
        }
        Ok(())
    }

    /// Re-queues a paused item
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Queued)
    }

    /// Re-queues a failed item, clearing the failure
    pub fn retry(&mut self) -> Result<(), DomainError> {
        if self.status != UploadStatus::Failed {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: UploadStatus::Queued.name().to_string(),
            });
        }
        self.transition_to(UploadStatus::Queued)?;
        self.error = None;
        self.response = None;
        if matches!(self.transfer, Some(Transfer::Simple)) {
            self.progress = Progress::new(self.source.size);
        }
        Ok(())
    }

    /// Re-queues a conflicted item with an explicit resolution
    ///
    /// Issues a fresh idempotency key, zeroes progress and forgets any
    /// session so the next attempt starts a new logical upload.
    pub fn resolve_conflict(&mut self, mode: ConflictMode) -> Result<(), DomainError> {
        if self.status != UploadStatus::Conflict {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: UploadStatus::Queued.name().to_string(),
            });
        }
        self.transition_to(UploadStatus::Queued)?;
        self.conflict_mode = Some(mode);
        self.idempotency_key = IdempotencyKey::new();
        self.progress = Progress::new(self.source.size);
        self.error = None;
        if let Some(Transfer::Session(session)) = self.transfer.as_mut() {
            session.session = None;
        }
        Ok(())
    }

    /// Cancels the item
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Cancelled)
    }

    /// Records a successful upload
    pub fn mark_succeeded(&mut self, response: serde_json::Value) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Succeeded)?;
        self.progress = Progress::complete(self.source.size);
        self.response = Some(response);
        self.error = None;
        Ok(())
    }

    /// Records a failed upload
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Records a naming conflict reported by the server
    pub fn mark_conflict(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Conflict)?;
        self.error = Some(message.into());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Progress and session bookkeeping
    // ------------------------------------------------------------------------

    /// Advances progress to `loaded` bytes
    ///
    /// Progress never moves backwards here; returns true if it changed.
    pub fn advance_progress(&mut self, loaded: u64) -> bool {
        let next = Progress::at(loaded, self.source.size);
        if next.loaded <= self.progress.loaded {
            return false;
        }
        self.progress = next;
        true
    }

    /// Sets progress to the offset confirmed by the server
    ///
    /// Unlike [`advance_progress`](Self::advance_progress) this may move
    /// backwards, e.g. after a session expired and restarts from zero.
    pub fn reconcile_progress(&mut self, received: u64) {
        self.progress = Progress::at(received, self.source.size);
    }

    /// Stores the session descriptor of a session-mode transfer
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` for simple-mode or unadmitted items.
    pub fn set_session(&mut self, info: Option<SessionInfo>) -> Result<(), DomainError> {
        match self.transfer.as_mut() {
            Some(Transfer::Session(session)) => {
                session.session = info;
                Ok(())
            }
            _ => Err(DomainError::ValidationFailed(format!(
                "item {} is not a session-mode transfer",
                self.id
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
