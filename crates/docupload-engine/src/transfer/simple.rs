//! Simple strategy: the whole file in one multipart request
//!
//! Progress comes from the store's byte-count callback. There is no
//! mid-flight resume; an aborted attempt restarts from zero.

use std::sync::Arc;

use docupload_core::ports::{Document, ProgressFn, SimpleUploadRequest};
use tracing::debug;

use super::{TransferContext, TransferEvent};
use crate::TransferError;

/// Uploads the item's source with a single request
///
/// # Errors
/// `Aborted` when cancelled, `Conflict` on 409, `Failed` otherwise
pub async fn run_simple(ctx: &TransferContext) -> Result<Document, TransferError> {
    ctx.check_cancelled()?;

    let request = SimpleUploadRequest {
        filename: ctx.source.name().to_string(),
        content_type: ctx.source.content_type().to_string(),
        byte_size: ctx.source.size(),
        idempotency_key: ctx.idempotency_key,
        conflict_mode: ctx.conflict_mode,
        run_options: ctx.run_options.clone(),
    };

    let events = ctx.events.clone();
    let progress: ProgressFn = Arc::new(move |sent| {
        let _ = events.send(TransferEvent::Progress(sent));
    });

    debug!(item_id = %ctx.item_id, bytes = request.byte_size, "Starting simple upload");
    let document = ctx
        .abortable(
            ctx.store
                .upload_simple(&request, Arc::clone(&ctx.source), progress),
        )
        .await??;

    ctx.emit(TransferEvent::Progress(request.byte_size));
    Ok(document)
}
