//! docupload API - HTTP client for the remote document store
//!
//! Provides an async client for:
//! - Single-request multipart uploads with streamed progress
//! - The resumable upload session protocol (create, status, range, commit, cancel)
//!
//! ## Modules
//!
//! - [`client`] - HTTP client with base URL and workspace path construction
//! - [`upload`] - One function per document store operation
//! - [`store`] - [`HttpDocumentStore`](store::HttpDocumentStore), the
//!   `DocumentStore` port implementation

pub mod client;
pub mod store;
pub mod upload;

pub use client::DocumentClient;
pub use store::HttpDocumentStore;

use thiserror::Error;

/// Errors that can occur while setting up the HTTP document store
///
/// Request-level failures are reported through
/// [`StoreError`](docupload_core::ports::StoreError) instead.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The base URL is not an absolute http(s) URL
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// No workspace was configured
    #[error("No workspace configured; set store.workspace_id or pass --workspace")]
    MissingWorkspace,

    /// The workspace id failed validation
    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
