//! Integration tests for the resumable upload session endpoints

use docupload_api::{DocumentClient, HttpDocumentStore};
use docupload_core::domain::{ConflictMode, UploadSessionId, WorkspaceId};
use docupload_core::ports::{document_id, DocumentStore, StoreError};
use wiremock::matchers::{body_bytes, body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn sid(id: &str) -> UploadSessionId {
    UploadSessionId::new(id.to_string()).unwrap()
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_session_sends_metadata_and_key() {
    let (server, store) = common::setup_store_mock().await;

    let mut request = common::session_request("archive.zip", 52_428_800);
    request.run_options = Some(serde_json::json!({"pipeline": "fast"}));
    request.conflict_mode = Some(ConflictMode::Replace);

    Mock::given(method("POST"))
        .and(path(common::SESSIONS_PATH))
        .and(header("Idempotency-Key", request.idempotency_key.to_string().as_str()))
        .and(body_json(serde_json::json!({
            "filename": "archive.zip",
            "byte_size": 52_428_800u64,
            "content_type": "application/zip",
            "run_options": {"pipeline": "fast"},
            "conflict_mode": "replace"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "upload_session_id": "sess-001",
            "chunk_size_bytes": 5_242_880u64,
            "next_expected_ranges": ["0-"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = store.create_session(&request).await.expect("create failed");
    assert_eq!(created.upload_session_id.as_deref(), Some("sess-001"));
    assert_eq!(created.chunk_size_bytes, Some(5_242_880));
    assert_eq!(created.next_expected_ranges, vec!["0-".to_string()]);
}

#[tokio::test]
async fn test_create_session_without_id_is_surfaced_as_missing() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path(common::SESSIONS_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"chunk_size_bytes": 1024})),
        )
        .mount(&server)
        .await;

    let created = store
        .create_session(&common::session_request("a.zip", 10))
        .await
        .expect("create failed");
    assert!(created.upload_session_id.is_none());
}

#[tokio::test]
async fn test_create_session_conflict() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path(common::SESSIONS_PATH))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let err = store
        .create_session(&common::session_request("a.zip", 10))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_session_status_returns_received_bytes() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_session_status(
        &server,
        "sess-002",
        200,
        serde_json::json!({"received_bytes": 10_485_760u64, "next_expected_ranges": ["10485760-"]}),
    )
    .await;

    let status = store.session_status(&sid("sess-002")).await.unwrap();
    assert_eq!(status.received_bytes, 10_485_760);
    assert_eq!(status.next_expected_ranges, vec!["10485760-".to_string()]);
}

#[tokio::test]
async fn test_session_status_expired() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_session_status(&server, "gone", 410, serde_json::json!({})).await;
    common::mount_session_status(&server, "missing", 404, serde_json::json!({})).await;

    let gone = store.session_status(&sid("gone")).await.unwrap_err();
    assert!(matches!(gone, StoreError::Gone(_)));
    assert!(gone.is_expired());

    let missing = store.session_status(&sid("missing")).await.unwrap_err();
    assert!(matches!(missing, StoreError::NotFound(_)));
    assert!(missing.is_expired());
}

// ============================================================================
// Upload range
// ============================================================================

#[tokio::test]
async fn test_upload_range_sends_content_range() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/sess-003", common::SESSIONS_PATH)))
        .and(header("Content-Range", "bytes 4-7/10"))
        .and(body_bytes(b"4567".to_vec()))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(serde_json::json!({"next_expected_ranges": ["8-"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ack = store
        .upload_range(&sid("sess-003"), 4, 10, b"4567".to_vec())
        .await
        .expect("range upload failed");
    assert_eq!(ack.next_expected_ranges, vec!["8-".to_string()]);
}

#[tokio::test]
async fn test_upload_range_accepts_empty_body() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/sess-004", common::SESSIONS_PATH)))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let ack = store
        .upload_range(&sid("sess-004"), 0, 3, b"abc".to_vec())
        .await
        .expect("range upload failed");
    assert!(ack.next_expected_ranges.is_empty());
}

#[tokio::test]
async fn test_upload_range_rejects_empty_chunk() {
    let (_server, store) = common::setup_store_mock().await;
    let err = store
        .upload_range(&sid("sess-005"), 0, 3, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}

// ============================================================================
// Commit and cancel
// ============================================================================

#[tokio::test]
async fn test_commit_returns_document() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path(format!("{}/sess-006/commit", common::SESSIONS_PATH)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": "doc-006", "name": "archive.zip"})),
        )
        .mount(&server)
        .await;

    let document = store.commit_session(&sid("sess-006")).await.unwrap();
    assert_eq!(document_id(&document), Some("doc-006"));
}

#[tokio::test]
async fn test_commit_conflict() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path(format!("{}/sess-007/commit", common::SESSIONS_PATH)))
        .respond_with(ResponseTemplate::new(409).set_body_string("already exists"))
        .mount(&server)
        .await;

    let err = store.commit_session(&sid("sess-007")).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn test_cancel_session() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{}/sess-008", common::SESSIONS_PATH)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.cancel_session(&sid("sess-008")).await.expect("cancel failed");
}

#[tokio::test]
async fn test_unreachable_server_maps_to_network_error() {
    let workspace = WorkspaceId::new(common::WORKSPACE.to_string()).unwrap();
    let store = HttpDocumentStore::new(DocumentClient::with_base_url(
        "http://127.0.0.1:1",
        workspace,
    ));

    let err = store.session_status(&sid("any")).await.unwrap_err();
    assert!(matches!(err, StoreError::Network(_)));
}
