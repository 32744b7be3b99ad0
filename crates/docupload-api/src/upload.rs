//! Upload operations against the document store
//!
//! One function per endpoint of the store's upload surface:
//! - [`upload_simple`] - Multipart upload of a whole file in one request
//! - [`create_upload_session`] - Starts a resumable session
//! - [`get_session_status`] - Asks how many bytes a session holds
//! - [`upload_range`] - Sends one chunk with a `Content-Range` header
//! - [`commit_session`] - Finalizes a fully uploaded session
//! - [`cancel_session`] - Deletes an in-progress session
//!
//! Every function maps HTTP failures onto [`StoreError`]: 409 is a
//! conflict, 404/410 mean the resource is gone, anything else non-2xx is a
//! generic status error.

use std::sync::Arc;
use std::task::Poll;

use docupload_core::domain::UploadSessionId;
use docupload_core::ports::{
    ByteSource, CreateSessionRequest, Document, ProgressFn, RangeAck, SessionCreated,
    SessionStatus, SimpleUploadRequest, StoreError,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::DocumentClient;

/// Header carrying the deduplication token of a logical upload
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Size of the slices a simple upload body is streamed in: 64 KiB
const STREAM_SLICE_SIZE: u64 = 64 * 1024;

// ============================================================================
// Response helpers
// ============================================================================

/// Maps a transport failure onto a store error
fn network_error(err: reqwest::Error) -> StoreError {
    StoreError::Network(err.to_string())
}

/// Passes 2xx responses through and classifies everything else
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no reason").to_string()
    } else {
        body
    };

    Err(match status {
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::GONE => StoreError::Gone(message),
        _ => StoreError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

/// Parses a JSON body; an empty body parses as `T::default()`
async fn parse_json_or_default<T: DeserializeOwned + Default>(
    response: Response,
) -> Result<T, StoreError> {
    let bytes = response.bytes().await.map_err(network_error)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

/// Parses a JSON document resource
async fn parse_document(response: Response) -> Result<Document, StoreError> {
    response
        .json()
        .await
        .map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

// ============================================================================
// Streamed request body
// ============================================================================

/// Builds a request body that reads `source` slice by slice
///
/// A background task reads the slices into a single-slot channel; `progress`
/// is called with the cumulative byte count as each slice is handed to the
/// transport. Dropping the body (e.g. because the request future was dropped)
/// stops the reader at its next send.
fn streamed_body(source: Arc<dyn ByteSource>, progress: ProgressFn) -> Body {
    let total = source.size();
    let (tx, mut rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(1);

    tokio::spawn(async move {
        let mut offset = 0u64;
        while offset < total {
            let end = (offset + STREAM_SLICE_SIZE).min(total);
            let slice = source.slice(offset, end).await;
            let failed = slice.is_err();
            if tx.send(slice).await.is_err() || failed {
                return;
            }
            offset = end;
        }
    });

    let mut sent = 0u64;
    let stream = futures_util::stream::poll_fn(move |cx| match rx.poll_recv(cx) {
        Poll::Ready(Some(Ok(chunk))) => {
            sent += chunk.len() as u64;
            progress(sent);
            Poll::Ready(Some(Ok(chunk)))
        }
        other => other,
    });

    Body::wrap_stream(stream)
}

// ============================================================================
// Simple upload
// ============================================================================

/// Uploads a whole file in one multipart request
///
/// `POST /workspaces/{id}/documents` with the file under the `file` field,
/// optional `run_options` (JSON text) and `conflict_mode` fields, and the
/// idempotency key as a header.
///
/// # Arguments
/// * `client` - The document client
/// * `request` - File metadata and upload options
/// * `source` - Bytes of the file
/// * `progress` - Called with the cumulative number of bytes sent
///
/// # Returns
/// The document resource created by the server
///
/// # Errors
/// `StoreError::Conflict` on 409, other variants on failure
pub async fn upload_simple(
    client: &DocumentClient,
    request: &SimpleUploadRequest,
    source: Arc<dyn ByteSource>,
    progress: ProgressFn,
) -> Result<Document, StoreError> {
    let path = client.documents_path();
    debug!(
        filename = %request.filename,
        bytes = request.byte_size,
        path = %path,
        "Uploading document in a single request"
    );

    let body = streamed_body(source, progress);
    let part = Part::stream_with_length(body, request.byte_size)
        .file_name(request.filename.clone())
        .mime_str(&request.content_type)
        .map_err(|e| {
            StoreError::InvalidRequest(format!(
                "content type '{}': {e}",
                request.content_type
            ))
        })?;

    let mut form = Form::new().part("file", part);
    if let Some(options) = &request.run_options {
        let text = serde_json::to_string(options)
            .map_err(|e| StoreError::InvalidRequest(format!("run_options: {e}")))?;
        form = form.text("run_options", text);
    }
    if let Some(mode) = request.conflict_mode {
        form = form.text("conflict_mode", mode.as_str());
    }

    let response = client
        .request(Method::POST, &path)
        .header(IDEMPOTENCY_KEY_HEADER, request.idempotency_key.to_string())
        .multipart(form)
        .send()
        .await
        .map_err(network_error)?;

    let document = parse_document(check_status(response).await?).await?;
    info!(filename = %request.filename, "Single-request upload completed");
    Ok(document)
}

// ============================================================================
// Session protocol
// ============================================================================

/// Creates a resumable upload session
///
/// `POST /workspaces/{id}/documents/uploadSessions`
///
/// # Errors
/// `StoreError::Conflict` on 409, other variants on failure
pub async fn create_upload_session(
    client: &DocumentClient,
    request: &CreateSessionRequest,
) -> Result<SessionCreated, StoreError> {
    debug!(
        filename = %request.filename,
        bytes = request.byte_size,
        "Creating upload session"
    );

    let response = client
        .request(Method::POST, &client.sessions_path())
        .header(IDEMPOTENCY_KEY_HEADER, request.idempotency_key.to_string())
        .json(request)
        .send()
        .await
        .map_err(network_error)?;

    let created: SessionCreated = parse_json_or_default(check_status(response).await?).await?;
    debug!(
        session_id = ?created.upload_session_id,
        chunk_size = ?created.chunk_size_bytes,
        "Upload session created"
    );
    Ok(created)
}

/// Queries the bytes a session already holds
///
/// `GET /workspaces/{id}/documents/uploadSessions/{sessionId}`
///
/// # Errors
/// `StoreError::NotFound` / `StoreError::Gone` when the session expired
pub async fn get_session_status(
    client: &DocumentClient,
    session_id: &UploadSessionId,
) -> Result<SessionStatus, StoreError> {
    let response = client
        .request(Method::GET, &client.session_path(session_id))
        .send()
        .await
        .map_err(network_error)?;

    let status: SessionStatus = parse_json_or_default(check_status(response).await?).await?;
    debug!(
        session_id = %session_id,
        received = status.received_bytes,
        "Fetched upload session status"
    );
    Ok(status)
}

/// Uploads one chunk of a session
///
/// `PUT /workspaces/{id}/documents/uploadSessions/{sessionId}` with the raw
/// bytes and `Content-Range: bytes {start}-{end}/{total}`, `end` inclusive.
///
/// # Arguments
/// * `client` - The document client
/// * `session_id` - Session to upload into
/// * `start` - Offset of the first byte of `data`
/// * `total` - Total size of the file
/// * `data` - The chunk bytes; must not be empty
///
/// # Errors
/// Any non-success response
pub async fn upload_range(
    client: &DocumentClient,
    session_id: &UploadSessionId,
    start: u64,
    total: u64,
    data: Vec<u8>,
) -> Result<RangeAck, StoreError> {
    if data.is_empty() {
        return Err(StoreError::InvalidRequest(format!(
            "empty range at offset {start}"
        )));
    }
    let len = data.len() as u64;
    let content_range = content_range(start, len, total);
    debug!(session_id = %session_id, range = %content_range, "Uploading range");

    let response = client
        .request(Method::PUT, &client.session_path(session_id))
        .header("Content-Type", "application/octet-stream")
        .header("Content-Range", &content_range)
        .body(data)
        .send()
        .await
        .map_err(network_error)?;

    parse_json_or_default(check_status(response).await?).await
}

/// Formats `bytes {start}-{end}/{total}` for a chunk of `len` bytes
pub fn content_range(start: u64, len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", start, start + len - 1, total)
}

/// Finalizes a session whose bytes were all acknowledged
///
/// `POST /workspaces/{id}/documents/uploadSessions/{sessionId}/commit`
///
/// # Errors
/// `StoreError::Conflict` on 409, other variants on failure
pub async fn commit_session(
    client: &DocumentClient,
    session_id: &UploadSessionId,
) -> Result<Document, StoreError> {
    debug!(session_id = %session_id, "Committing upload session");

    let response = client
        .request(Method::POST, &client.commit_path(session_id))
        .send()
        .await
        .map_err(network_error)?;

    let document = parse_document(check_status(response).await?).await?;
    info!(session_id = %session_id, "Upload session committed");
    Ok(document)
}

/// Deletes an in-progress session
///
/// `DELETE /workspaces/{id}/documents/uploadSessions/{sessionId}`
///
/// # Errors
/// Any non-success response
pub async fn cancel_session(
    client: &DocumentClient,
    session_id: &UploadSessionId,
) -> Result<(), StoreError> {
    debug!(session_id = %session_id, "Cancelling upload session");

    let response = client
        .request(Method::DELETE, &client.session_path(session_id))
        .send()
        .await
        .map_err(network_error)?;

    check_status(response).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
