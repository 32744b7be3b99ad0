//! End-to-end queue runs over HTTP

use std::sync::Arc;
use std::time::Duration;

use docupload_api::{DocumentClient, HttpDocumentStore};
use docupload_core::domain::{ConflictMode, TransferMode, UploadStatus, WorkspaceId};
use docupload_core::ports::{ByteSource, DocumentStore, MemorySource};
use docupload_engine::{EngineConfig, UploadQueue};
use tokio::runtime::Handle;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCUMENTS_PATH: &str = "/workspaces/ws-e2e/documents";
const SESSIONS_PATH: &str = "/workspaces/ws-e2e/documents/uploadSessions";

async fn setup(concurrency: usize, session_threshold: u64) -> (MockServer, UploadQueue) {
    let server = MockServer::start().await;
    let workspace = WorkspaceId::new("ws-e2e".to_string()).unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(HttpDocumentStore::new(
        DocumentClient::with_base_url(server.uri(), workspace),
    ));
    let config = EngineConfig {
        concurrency,
        session_threshold,
        progress_interval: Duration::from_millis(10),
    };
    (server, UploadQueue::new(store, config, Handle::current()))
}

fn source(name: &str, size: usize) -> Arc<dyn ByteSource> {
    Arc::new(MemorySource::new(name, "text/plain", vec![b'x'; size]))
}

async fn settle(queue: &UploadQueue) {
    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .expect("queue never became idle");
}

#[tokio::test]
async fn test_session_upload_over_http() {
    let (server, queue) = setup(2, 8).await;

    Mock::given(method("POST"))
        .and(path(SESSIONS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "upload_session_id": "sess-1",
            "chunk_size_bytes": 4,
            "next_expected_ranges": ["0-"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    for range in ["bytes 0-3/10", "bytes 4-7/10", "bytes 8-9/10"] {
        Mock::given(method("PUT"))
            .and(path(format!("{SESSIONS_PATH}/sess-1")))
            .and(header("Content-Range", range))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "next_expected_ranges": []
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(format!("{SESSIONS_PATH}/sess-1/commit")))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "doc-9"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = queue.enqueue(vec![source("notes.txt", 10)], None)[0].id();
    settle(&queue).await;

    let item = queue.get(id).unwrap();
    assert_eq!(item.status(), UploadStatus::Succeeded);
    assert_eq!(item.mode(), Some(TransferMode::Session));
    assert_eq!(item.response().unwrap()["id"], "doc-9");
    assert_eq!(item.progress().percent, 100);
}

#[tokio::test]
async fn test_simple_upload_conflict_then_rename() {
    let (server, queue) = setup(1, 1024).await;

    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_string("document exists"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let id = queue.enqueue(vec![source("a.txt", 12)], None)[0].id();
    settle(&queue).await;

    let item = queue.get(id).unwrap();
    assert_eq!(item.status(), UploadStatus::Conflict);
    assert_eq!(item.error(), Some("document exists"));
    let old_key = item.idempotency_key();

    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "doc-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert!(queue.resolve_conflict(id, ConflictMode::Rename));
    settle(&queue).await;

    let item = queue.get(id).unwrap();
    assert_eq!(item.status(), UploadStatus::Succeeded);
    assert_ne!(item.idempotency_key(), old_key);

    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap();
    assert_eq!(
        last.headers.get("Idempotency-Key").unwrap().to_str().unwrap(),
        item.idempotency_key().to_string()
    );
    assert!(String::from_utf8_lossy(&last.body).contains("rename"));
}

#[tokio::test]
async fn test_server_error_fails_item_and_retry_recovers() {
    let (server, queue) = setup(1, 1024).await;

    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "doc-2"})),
        )
        .mount(&server)
        .await;

    let id = queue.enqueue(vec![source("b.txt", 3)], None)[0].id();
    settle(&queue).await;

    let failed = queue.get(id).unwrap();
    assert_eq!(failed.status(), UploadStatus::Failed);
    assert_eq!(failed.error(), Some("HTTP 503: Service Unavailable"));

    assert!(queue.retry(id));
    settle(&queue).await;
    assert_eq!(queue.get(id).unwrap().status(), UploadStatus::Succeeded);
}
