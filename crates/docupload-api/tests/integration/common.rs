//! Shared test helpers for document store integration tests
//!
//! Each helper mounts the endpoints a test needs on a wiremock server and
//! returns a store pointing at it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docupload_api::{DocumentClient, HttpDocumentStore};
use docupload_core::domain::{IdempotencyKey, WorkspaceId};
use docupload_core::ports::{CreateSessionRequest, ProgressFn, SimpleUploadRequest};

pub const WORKSPACE: &str = "ws-test";
pub const DOCUMENTS_PATH: &str = "/workspaces/ws-test/documents";
pub const SESSIONS_PATH: &str = "/workspaces/ws-test/documents/uploadSessions";

/// Starts a mock server and returns a store scoped to [`WORKSPACE`]
pub async fn setup_store_mock() -> (MockServer, HttpDocumentStore) {
    let server = MockServer::start().await;
    let workspace = WorkspaceId::new(WORKSPACE.to_string()).unwrap();
    let store = HttpDocumentStore::new(DocumentClient::with_base_url(server.uri(), workspace));
    (server, store)
}

/// Returns a progress callback and the cell it records the last value into
pub fn progress_recorder() -> (ProgressFn, Arc<AtomicU64>) {
    let last = Arc::new(AtomicU64::new(0));
    let cell = Arc::clone(&last);
    let progress: ProgressFn = Arc::new(move |sent| cell.store(sent, Ordering::SeqCst));
    (progress, last)
}

pub fn simple_request(filename: &str, size: u64) -> SimpleUploadRequest {
    SimpleUploadRequest {
        filename: filename.to_string(),
        content_type: "text/plain".to_string(),
        byte_size: size,
        idempotency_key: IdempotencyKey::new(),
        conflict_mode: None,
        run_options: None,
    }
}

pub fn session_request(filename: &str, size: u64) -> CreateSessionRequest {
    CreateSessionRequest {
        filename: filename.to_string(),
        byte_size: size,
        content_type: "application/zip".to_string(),
        run_options: None,
        conflict_mode: None,
        idempotency_key: IdempotencyKey::new(),
    }
}

/// Mounts `POST /documents` answering with `status` and `body`
pub async fn mount_simple_upload(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts `GET /uploadSessions/{id}` answering with `status` and `body`
pub async fn mount_session_status(
    server: &MockServer,
    session_id: &str,
    status: u16,
    body: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path(format!("{SESSIONS_PATH}/{session_id}")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
