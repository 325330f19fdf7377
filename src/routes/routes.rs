//! Defines routes for the resumable upload protocol.
//!
//! ## Structure
//! - **Protocol endpoints**
//!   - `POST /upload` — store one chunk (multipart: chunk, hash, fileHash, filename)
//!   - `POST /merge`  — merge staged chunks (JSON: fileHash, filename, size)
//!   - `POST /verify` — resume/skip decision (JSON: fileHash, filename)
//!
//! - **Probes**
//!   - `GET /healthz`, `GET /readyz`
//!
//! Every route answers cross-origin requests from any origin; pre-flight
//! `OPTIONS` gets an empty 200 from the CORS layer.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{merge_chunks, upload_chunk, verify_upload},
    },
    services::UploadService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Multipart framing and the text fields around the chunk bytes.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the router. Request bodies are capped at `max_chunk_bytes` plus
/// room for the multipart envelope.
pub fn routes(max_chunk_bytes: usize) -> Router<UploadService> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/upload", post(upload_chunk))
        .route("/merge", post(merge_chunks))
        .route("/verify", post(verify_upload))
        .layer(DefaultBodyLimit::max(
            max_chunk_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
