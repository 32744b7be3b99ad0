//! Integration tests for docupload-engine
//!
//! Drives the upload queue against the HTTP document store, with wiremock
//! standing in for the server.

mod test_http_queue;
