//! Integration tests for the single-request multipart upload

use std::sync::atomic::Ordering;
use std::sync::Arc;

use docupload_core::domain::ConflictMode;
use docupload_core::ports::{document_id, DocumentStore, MemorySource, StoreError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_simple_upload_returns_document_and_reports_progress() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_simple_upload(
        &server,
        201,
        serde_json::json!({"id": "doc-001", "name": "notes.txt"}),
    )
    .await;

    let content = b"Plain text content for a small upload".to_vec();
    let size = content.len() as u64;
    let source = Arc::new(MemorySource::new("notes.txt", "text/plain", content));
    let request = common::simple_request("notes.txt", size);
    let (progress, last) = common::progress_recorder();

    let document = store
        .upload_simple(&request, source, progress)
        .await
        .expect("simple upload failed");

    assert_eq!(document_id(&document), Some("doc-001"));
    assert_eq!(last.load(Ordering::SeqCst), size);
}

#[tokio::test]
async fn test_simple_upload_sends_form_fields_and_idempotency_key() {
    let (server, store) = common::setup_store_mock().await;

    let mut request = common::simple_request("report.txt", 11);
    request.run_options = Some(serde_json::json!({"ocr": true}));
    request.conflict_mode = Some(ConflictMode::Rename);

    Mock::given(method("POST"))
        .and(path(common::DOCUMENTS_PATH))
        .and(header("Idempotency-Key", request.idempotency_key.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "doc-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(MemorySource::new("report.txt", "text/plain", b"hello world".to_vec()));
    let (progress, _) = common::progress_recorder();
    store
        .upload_simple(&request, source, progress)
        .await
        .expect("simple upload failed");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body = String::from_utf8_lossy(&received[0].body);
    assert!(body.contains("name=\"file\"; filename=\"report.txt\""));
    assert!(body.contains("hello world"));
    assert!(body.contains("name=\"run_options\""));
    assert!(body.contains(r#"{"ocr":true}"#));
    assert!(body.contains("name=\"conflict_mode\""));
    assert!(body.contains("rename"));
}

#[tokio::test]
async fn test_simple_upload_streams_large_body_in_slices() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_simple_upload(&server, 201, serde_json::json!({"id": "doc-big"})).await;

    let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let size = content.len() as u64;
    let source = Arc::new(MemorySource::new("blob.bin", "application/octet-stream", content.clone()));
    let (progress, last) = common::progress_recorder();

    store
        .upload_simple(&common::simple_request("blob.bin", size), source, progress)
        .await
        .expect("simple upload failed");

    assert_eq!(last.load(Ordering::SeqCst), size);
    let received = server.received_requests().await.unwrap();
    let body = &received[0].body;
    assert!(body.windows(content.len()).any(|w| w == content.as_slice()));
}

#[tokio::test]
async fn test_simple_upload_conflict_maps_to_conflict() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_simple_upload(&server, 409, serde_json::json!({"error": "name exists"})).await;

    let source = Arc::new(MemorySource::new("dup.txt", "text/plain", b"dup".to_vec()));
    let (progress, _) = common::progress_recorder();
    let err = store
        .upload_simple(&common::simple_request("dup.txt", 3), source, progress)
        .await
        .unwrap_err();

    assert!(err.is_conflict(), "expected conflict, got {err:?}");
    assert!(err.to_string().contains("name exists"));
}

#[tokio::test]
async fn test_simple_upload_server_error_maps_to_status() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_simple_upload(&server, 503, serde_json::json!({"error": "down"})).await;

    let source = Arc::new(MemorySource::new("a.txt", "text/plain", b"a".to_vec()));
    let (progress, _) = common::progress_recorder();
    let err = store
        .upload_simple(&common::simple_request("a.txt", 1), source, progress)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_simple_upload_rejects_bad_content_type() {
    let (_server, store) = common::setup_store_mock().await;

    let mut request = common::simple_request("a.txt", 1);
    request.content_type = "not a mime type".to_string();
    let source = Arc::new(MemorySource::new("a.txt", "text/plain", b"a".to_vec()));
    let (progress, _) = common::progress_recorder();

    let err = store.upload_simple(&request, source, progress).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}
