//! Document store HTTP client
//!
//! Wraps `reqwest::Client` with the store's base URL and the workspace every
//! request is scoped to, and builds the paths of the document endpoints.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use docupload_api::client::DocumentClient;
//! use docupload_core::domain::WorkspaceId;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let workspace: WorkspaceId = "ws-42".parse()?;
//! let client = DocumentClient::new("https://docs.example.com/api", workspace, Duration::from_secs(60))?;
//! assert_eq!(client.documents_path(), "/workspaces/ws-42/documents");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use docupload_core::domain::{UploadSessionId, WorkspaceId};
use reqwest::{Client, Method, RequestBuilder};
use tracing::debug;
use url::Url;

use crate::ApiError;

// ============================================================================
// DocumentClient
// ============================================================================

/// HTTP client for one workspace of the document store
#[derive(Debug, Clone)]
pub struct DocumentClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Workspace all paths are scoped to
    workspace: WorkspaceId,
}

impl DocumentClient {
    /// Creates a client with a per-request timeout
    ///
    /// # Arguments
    /// * `base_url` - Absolute http(s) URL of the store API
    /// * `workspace` - Workspace documents are uploaded into
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    /// Returns `ApiError::InvalidBaseUrl` for relative or non-http URLs and
    /// `ApiError::Client` if the TLS backend cannot be initialized.
    pub fn new(base_url: &str, workspace: WorkspaceId, timeout: Duration) -> Result<Self, ApiError> {
        let parsed =
            Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBaseUrl(format!(
                "{base_url}: unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        debug!(base_url, workspace = %workspace, "Created document store client");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            workspace,
        })
    }

    /// Creates a client with default settings (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>, workspace: WorkspaceId) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            workspace,
        }
    }

    /// Returns the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the workspace
    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    /// Creates a request builder for the given method and path
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to the base URL, starting with `/`
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url)
    }

    // ------------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------------

    /// `/workspaces/{id}/documents`
    pub fn documents_path(&self) -> String {
        format!("/workspaces/{}/documents", self.workspace)
    }

    /// `/workspaces/{id}/documents/uploadSessions`
    pub fn sessions_path(&self) -> String {
        format!("{}/uploadSessions", self.documents_path())
    }

    /// `/workspaces/{id}/documents/uploadSessions/{sessionId}`
    pub fn session_path(&self, session_id: &UploadSessionId) -> String {
        format!("{}/{}", self.sessions_path(), session_id)
    }

    /// `/workspaces/{id}/documents/uploadSessions/{sessionId}/commit`
    pub fn commit_path(&self, session_id: &UploadSessionId) -> String {
        format!("{}/commit", self.session_path(session_id))
    }
}
