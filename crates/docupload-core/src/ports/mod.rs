//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the upload engine depends on. Their
//! implementations live in adapter crates (`docupload-api` for HTTP) or in
//! this crate when they have no external dependency (memory and file
//! byte sources).
//!
//! ## Ports Overview
//!
//! - [`DocumentStore`] - Remote document store: simple upload and the
//!   resumable session protocol
//! - [`ByteSource`] - Random-access bytes behind an upload item

pub mod byte_source;
pub mod document_store;

pub use byte_source::{ByteSource, FileSource, MemorySource};
pub use document_store::{
    document_id, CreateSessionRequest, Document, DocumentStore, ProgressFn, RangeAck,
    SessionCreated, SessionStatus, SimpleUploadRequest, StoreError,
};
