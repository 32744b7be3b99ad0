//! Document store port (driven/secondary port)
//!
//! This module defines the interface to the remote document store: a
//! single-request upload for small files and the resumable session protocol
//! (create, status, upload range, commit, cancel) for large ones.
//!
//! ## Design Notes
//!
//! - Errors are classified with [`StoreError`] rather than `anyhow`, because
//!   the engine routes items differently on conflict, session expiry and
//!   generic failure.
//! - DTOs mirror the wire shape. Required fields the server may omit are
//!   `Option`s here so the engine can report a protocol violation instead
//!   of a deserialization error.
//! - The document resource returned by simple upload and commit is opaque.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::byte_source::ByteSource;
use crate::domain::{ConflictMode, IdempotencyKey, UploadSessionId};

/// Server-confirmed document resource
pub type Document = serde_json::Value;

/// Callback receiving the number of body bytes sent so far
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Best-effort accessor for the `id` of a document resource
pub fn document_id(document: &Document) -> Option<&str> {
    document.get("id").and_then(serde_json::Value::as_str)
}

// ============================================================================
// StoreError
// ============================================================================

/// Errors returned by a [`DocumentStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Naming collision (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource expired (HTTP 410)
    #[error("Gone: {0}")]
    Gone(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built from the item metadata
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Reading the byte source failed
    #[error("Source read failed: {0}")]
    Source(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if a session lookup failed because the session expired
    pub fn is_expired(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Gone(_))
    }

    /// Returns true for naming collisions
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Metadata of a single-request upload
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleUploadRequest {
    /// File name
    pub filename: String,
    /// MIME type of the file part
    pub content_type: String,
    /// Total size in bytes
    pub byte_size: u64,
    /// Sent as the `Idempotency-Key` header
    pub idempotency_key: IdempotencyKey,
    /// Resolution for an earlier naming conflict
    pub conflict_mode: Option<ConflictMode>,
    /// Forwarded as the `run_options` form field
    pub run_options: Option<serde_json::Value>,
}

/// Body of a session create call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSessionRequest {
    /// File name
    pub filename: String,
    /// Total size in bytes
    pub byte_size: u64,
    /// MIME type
    pub content_type: String,
    /// Forwarded run metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_options: Option<serde_json::Value>,
    /// Resolution for an earlier naming conflict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_mode: Option<ConflictMode>,
    /// Sent as the `Idempotency-Key` header, not in the body
    #[serde(skip)]
    pub idempotency_key: IdempotencyKey,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Response of a session create call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionCreated {
    /// Server-assigned session id; required
    #[serde(default)]
    pub upload_session_id: Option<String>,
    /// Maximum bytes per range request; required and non-zero
    #[serde(default)]
    pub chunk_size_bytes: Option<u64>,
    /// Ranges the server expects next
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// Response of a session status call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionStatus {
    /// Bytes the server already holds
    #[serde(default)]
    pub received_bytes: u64,
    /// Ranges the server expects next
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// Response of an upload range call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RangeAck {
    /// Ranges the server expects next
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

// ============================================================================
// DocumentStore trait
// ============================================================================

/// Port trait for the remote document store
///
/// Implementations map transport failures onto [`StoreError`]; they do not
/// retry. Cancellation is handled by the caller dropping the returned future.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Uploads a whole file in one multipart request
    ///
    /// `progress` is called with the cumulative number of body bytes handed
    /// to the transport.
    ///
    /// # Errors
    /// `StoreError::Conflict` on 409, other variants on failure
    async fn upload_simple(
        &self,
        request: &SimpleUploadRequest,
        source: Arc<dyn ByteSource>,
        progress: ProgressFn,
    ) -> Result<Document, StoreError>;

    /// Creates a resumable upload session
    ///
    /// # Errors
    /// `StoreError::Conflict` on 409, other variants on failure
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionCreated, StoreError>;

    /// Queries how many bytes the server holds for a session
    ///
    /// # Errors
    /// `StoreError::NotFound`/`StoreError::Gone` when the session expired
    async fn session_status(&self, session_id: &UploadSessionId)
        -> Result<SessionStatus, StoreError>;

    /// Uploads the bytes `[start, start + data.len())` of a `total`-byte file
    ///
    /// # Errors
    /// Any non-success response
    async fn upload_range(
        &self,
        session_id: &UploadSessionId,
        start: u64,
        total: u64,
        data: Vec<u8>,
    ) -> Result<RangeAck, StoreError>;

    /// Finalizes a session once every byte is acknowledged
    ///
    /// # Errors
    /// `StoreError::Conflict` on 409, other variants on failure
    async fn commit_session(&self, session_id: &UploadSessionId) -> Result<Document, StoreError>;

    /// Deletes an in-progress session
    ///
    /// # Errors
    /// Any non-success response; callers treat this as best effort
    async fn cancel_session(&self, session_id: &UploadSessionId) -> Result<(), StoreError>;
}
