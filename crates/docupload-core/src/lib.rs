//! docupload Core - Domain logic for the resumable upload engine
//!
//! This crate contains the transport-agnostic core with:
//! - **Domain entities** - `UploadItem`, `UploadStatus`, `Progress`, `Transfer`
//! - **Port definitions** - Traits for adapters: `DocumentStore`, `ByteSource`
//! - **State machine** - The per-item upload lifecycle
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`docupload-api` for HTTP, in-memory fakes for tests).
//! The `docupload-engine` crate orchestrates domain entities through
//! these ports.

pub mod config;
pub mod domain;
pub mod ports;
