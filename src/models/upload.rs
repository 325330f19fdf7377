//! Request and response bodies for the upload protocol endpoints.
//!
//! Field names follow the browser client (`fileHash`, `shouldUpload`, ...).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Fields collected from one `POST /upload` multipart form.
#[derive(Debug, Clone, Default)]
pub struct ChunkUpload {
    /// `chunk` file part.
    pub chunk: Option<Bytes>,
    /// `hash` field: the chunk label.
    pub chunk_hash: Option<String>,
    /// `fileHash` field: content hash of the whole file.
    pub file_hash: Option<String>,
    pub filename: Option<String>,
}

/// `POST /merge` body.
///
/// Fields are optional so a missing field is reported as a protocol error
/// rather than a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_hash: Option<String>,
    pub filename: Option<String>,
    /// Chunk size in bytes used when the file was split.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeResponse {
    pub code: i32,
    pub message: String,
}

impl MergeResponse {
    pub fn merged() -> Self {
        Self {
            code: 0,
            message: "file merged success".into(),
        }
    }
}

/// `POST /verify` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub file_hash: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub should_upload: bool,
    pub uploaded_list: Vec<String>,
}
