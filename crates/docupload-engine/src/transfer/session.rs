//! Session strategy: the resumable chunked upload protocol
//!
//! ```text
//!   session known? ── no ──► Create ─────────────────────┐
//!        │                                               │
//!       yes                                              ▼
//!        │                                  ┌───► Upload range ──┐
//!        ▼                                  │   (chunk ≤ server   │
//!     Status ── 404/410 ──► discard, Create │    chunk size)      │
//!        │                                  └── received < total ◄┘
//!        └── received_bytes ─────────────────────────► │
//!                                                      ▼ received == total
//!                                                    Commit
//! ```
//!
//! The local byte counter is never trusted across runs: a resumed transfer
//! always starts from the offset the server reports.

use docupload_core::domain::{SessionInfo, UploadSessionId};
use docupload_core::ports::{CreateSessionRequest, Document, SessionCreated, StoreError};
use tracing::{debug, info};

use super::{TransferContext, TransferEvent};
use crate::TransferError;

/// Uploads the item's source through an upload session
///
/// # Errors
/// `Aborted` when cancelled, `Conflict` on 409 from create or commit,
/// `Protocol` for malformed create responses, `Failed` otherwise
pub async fn run_session(ctx: &TransferContext) -> Result<Document, TransferError> {
    ctx.check_cancelled()?;
    let total = ctx.source.size();

    let (session, mut received) = match ctx.session.clone() {
        Some(existing) => match resume(ctx, existing, total).await? {
            Some(resumed) => resumed,
            None => (create(ctx, total).await?, 0),
        },
        None => (create(ctx, total).await?, 0),
    };

    let session_id = &session.session_id;
    let chunk_size = session.chunk_size_bytes;

    while received < total {
        ctx.check_cancelled()?;

        let end = received.saturating_add(chunk_size).min(total);
        let data = ctx
            .abortable(ctx.source.slice(received, end))
            .await?
            .map_err(StoreError::from)?;

        ctx.abortable(ctx.store.upload_range(session_id, received, total, data))
            .await??;

        received = end;
        debug!(
            item_id = %ctx.item_id,
            session_id = %session_id,
            offset = received,
            total,
            "Range acknowledged"
        );
        ctx.emit(TransferEvent::Progress(received));
    }

    ctx.check_cancelled()?;
    let document = ctx
        .abortable(ctx.store.commit_session(session_id))
        .await??;

    info!(item_id = %ctx.item_id, session_id = %session_id, "Upload session committed");
    Ok(document)
}

/// Re-derives the server offset of an existing session
///
/// Returns `None` if the session expired and a new one must be created.
async fn resume(
    ctx: &TransferContext,
    mut session: SessionInfo,
    total: u64,
) -> Result<Option<(SessionInfo, u64)>, TransferError> {
    match ctx
        .abortable(ctx.store.session_status(&session.session_id))
        .await?
    {
        Ok(status) => {
            let received = status.received_bytes.min(total);
            debug!(
                item_id = %ctx.item_id,
                session_id = %session.session_id,
                received,
                "Resuming upload session"
            );
            session.next_expected_ranges = status.next_expected_ranges;
            ctx.emit(TransferEvent::Reconciled(received));
            Ok(Some((session, received)))
        }
        Err(e) if e.is_expired() => {
            info!(
                item_id = %ctx.item_id,
                session_id = %session.session_id,
                reason = %e,
                "Upload session expired, restarting from byte 0"
            );
            ctx.emit(TransferEvent::SessionCleared);
            ctx.emit(TransferEvent::Reconciled(0));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates a fresh session and publishes it to the driver
async fn create(ctx: &TransferContext, total: u64) -> Result<SessionInfo, TransferError> {
    ctx.check_cancelled()?;

    let request = CreateSessionRequest {
        filename: ctx.source.name().to_string(),
        byte_size: total,
        content_type: ctx.source.content_type().to_string(),
        run_options: ctx.run_options.clone(),
        conflict_mode: ctx.conflict_mode,
        idempotency_key: ctx.idempotency_key,
    };

    let created = ctx.abortable(ctx.store.create_session(&request)).await??;
    let session = validate_created(created)?;

    debug!(
        item_id = %ctx.item_id,
        session_id = %session.session_id,
        chunk_size = session.chunk_size_bytes,
        "Upload session created"
    );
    ctx.emit(TransferEvent::SessionAssigned(session.clone()));
    Ok(session)
}

/// Checks the required fields of a create response
fn validate_created(created: SessionCreated) -> Result<SessionInfo, TransferError> {
    let raw_id = created.upload_session_id.ok_or_else(|| {
        TransferError::Protocol("create response missing upload_session_id".to_string())
    })?;
    let session_id = UploadSessionId::new(raw_id)
        .map_err(|e| TransferError::Protocol(format!("bad upload_session_id: {e}")))?;

    let chunk_size_bytes = match created.chunk_size_bytes {
        Some(size) if size > 0 => size,
        Some(_) => {
            return Err(TransferError::Protocol(
                "chunk_size_bytes must be greater than 0".to_string(),
            ))
        }
        None => {
            return Err(TransferError::Protocol(
                "create response missing chunk_size_bytes".to_string(),
            ))
        }
    };

    Ok(SessionInfo {
        session_id,
        chunk_size_bytes,
        next_expected_ranges: created.next_expected_ranges,
    })
}
