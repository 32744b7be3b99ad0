//! Domain entities and business logic
//!
//! This module contains the core domain types for docupload:
//! - Newtypes for type-safe identifiers
//! - The upload item entity and its state machine
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod upload_item;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::*;
pub use upload_item::{
    ConflictMode, Progress, SessionInfo, SessionTransfer, SourceInfo, Transfer, TransferMode,
    UploadItem, UploadStatus, percent_of,
};
