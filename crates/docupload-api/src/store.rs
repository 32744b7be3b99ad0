//! HttpDocumentStore - DocumentStore implementation over HTTP
//!
//! Wraps the [`DocumentClient`] and delegates to the [`upload`](crate::upload)
//! functions to fulfil the [`DocumentStore`] port contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docupload_core::config::StoreConfig;
use docupload_core::domain::{UploadSessionId, WorkspaceId};
use docupload_core::ports::{
    ByteSource, CreateSessionRequest, Document, DocumentStore, ProgressFn, RangeAck,
    SessionCreated, SessionStatus, SimpleUploadRequest, StoreError,
};

use crate::client::DocumentClient;
use crate::upload;
use crate::ApiError;

/// [`DocumentStore`] backed by the document store's HTTP API
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: DocumentClient,
}

impl HttpDocumentStore {
    /// Wraps an existing client
    pub fn new(client: DocumentClient) -> Self {
        Self { client }
    }

    /// Builds a store from the `store` configuration section
    ///
    /// `workspace` overrides `store.workspace_id` when given.
    ///
    /// # Errors
    /// Returns an error if no workspace is available, the workspace id is
    /// invalid or the base URL is rejected.
    pub fn from_config(config: &StoreConfig, workspace: Option<&str>) -> Result<Self, ApiError> {
        let raw = workspace
            .or(config.workspace_id.as_deref())
            .ok_or(ApiError::MissingWorkspace)?;
        let workspace: WorkspaceId = raw
            .parse()
            .map_err(|e| ApiError::InvalidWorkspace(format!("{raw}: {e}")))?;

        let client = DocumentClient::new(
            &config.base_url,
            workspace,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client))
    }

    /// Returns the underlying client
    pub fn client(&self) -> &DocumentClient {
        &self.client
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn upload_simple(
        &self,
        request: &SimpleUploadRequest,
        source: Arc<dyn ByteSource>,
        progress: ProgressFn,
    ) -> Result<Document, StoreError> {
        upload::upload_simple(&self.client, request, source, progress).await
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionCreated, StoreError> {
        upload::create_upload_session(&self.client, request).await
    }

    async fn session_status(
        &self,
        session_id: &UploadSessionId,
    ) -> Result<SessionStatus, StoreError> {
        upload::get_session_status(&self.client, session_id).await
    }

    async fn upload_range(
        &self,
        session_id: &UploadSessionId,
        start: u64,
        total: u64,
        data: Vec<u8>,
    ) -> Result<RangeAck, StoreError> {
        upload::upload_range(&self.client, session_id, start, total, data).await
    }

    async fn commit_session(&self, session_id: &UploadSessionId) -> Result<Document, StoreError> {
        upload::commit_session(&self.client, session_id).await
    }

    async fn cancel_session(&self, session_id: &UploadSessionId) -> Result<(), StoreError> {
        upload::cancel_session(&self.client, session_id).await
    }
}
