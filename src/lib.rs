//! Resumable chunked upload server.
//!
//! Browsers split a file into fixed-size chunks, name the upload by the
//! file's content hash, and send chunks one by one. The server stages them
//! per hash, reports what it already has so interrupted uploads can resume,
//! and merges everything into `<hash><ext>` once the client asks for it.
//!
//! The binary in `main.rs` wires [`services::UploadService`] into the axum
//! router from [`routes`].

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use axum::Router;
use std::path::PathBuf;

/// Router with state attached, ready to serve.
pub fn app(upload_dir: impl Into<PathBuf>, max_chunk_bytes: usize) -> Router {
    routes::routes::routes(max_chunk_bytes).with_state(services::UploadService::new(upload_dir))
}
