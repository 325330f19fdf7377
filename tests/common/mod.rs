//! Shared helpers for HTTP-level tests.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use resumable_upload::client::{HashAlgorithm, chunk_label, hash_chunks, plan_chunks};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

pub const MAX_CHUNK_BYTES: usize = 4 * 1024 * 1024;
const BOUNDARY: &str = "----resumable-upload-test-boundary";

#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let router = resumable_upload::app(dir.path(), MAX_CHUNK_BYTES);
        Self { router, dir }
    }

    /// Simulate a process restart: fresh router, same upload root.
    pub fn restart(self) -> Self {
        let router = resumable_upload::app(self.dir.path(), MAX_CHUNK_BYTES);
        Self {
            router,
            dir: self.dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    pub async fn upload_chunk(
        &self,
        file: &TestFile,
        index: usize,
    ) -> (StatusCode, String) {
        let range = file.ranges[index].clone();
        let bytes = &file.data[range.start as usize..range.end as usize];
        let label = chunk_label(&file.hash, index);
        let request = multipart_request(&[
            Part::File("chunk", bytes),
            Part::Text("hash", &label),
            Part::Text("fileHash", &file.hash),
            Part::Text("filename", &file.name),
        ]);
        let (status, body) = self.send(request).await;
        (status, String::from_utf8(body).unwrap())
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn verify(&self, file: &TestFile) -> (StatusCode, Value) {
        self.post_json(
            "/verify",
            serde_json::json!({ "fileHash": file.hash, "filename": file.name }),
        )
        .await
    }

    pub async fn merge(&self, file: &TestFile) -> (StatusCode, Value) {
        self.post_json(
            "/merge",
            serde_json::json!({
                "fileHash": file.hash,
                "filename": file.name,
                "size": file.chunk_size,
            }),
        )
        .await
    }

    pub fn final_path(&self, file: &TestFile) -> std::path::PathBuf {
        let ext = file.name.rfind('.').map(|i| &file.name[i..]).unwrap_or(".bin");
        self.root().join(format!("{}{}", file.hash, ext))
    }
}

/// A file split and hashed the way the browser client does it.
#[allow(dead_code)]
pub struct TestFile {
    pub name: String,
    pub data: Vec<u8>,
    pub chunk_size: u64,
    pub ranges: Vec<std::ops::Range<u64>>,
    pub hash: String,
}

#[allow(dead_code)]
impl TestFile {
    pub fn new(name: &str, len: usize, chunk_size: u64) -> Self {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8 ^ (i / 251) as u8).collect();
        let ranges = plan_chunks(len as u64, chunk_size).unwrap();
        let hash = hash_chunks(
            HashAlgorithm::Sha256,
            ranges
                .iter()
                .map(|r| &data[r.start as usize..r.end as usize])
                .collect::<Vec<_>>(),
            |_| {},
        );
        Self {
            name: name.to_string(),
            data,
            chunk_size,
            ranges,
            hash,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.ranges.len()
    }
}

#[allow(dead_code)]
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

#[allow(dead_code)]
pub fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"blob\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
