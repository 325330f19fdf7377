//! src/services/upload_service.rs
//!
//! UploadService — the resumable upload protocol over local disk. Owns the
//! chunk store, coordinator, merge engine and verifier, all sharing one
//! [`StorageLayout`] rooted at the configured upload directory.
//!
//! Handlers pass raw request fields in; this is where missing or malformed
//! identifiers become [`UploadError::InvalidRequest`].

use crate::models::{
    chunk::{ChunkLabel, FileExtension, SessionId},
    upload::{ChunkUpload, MergeRequest, VerifyRequest},
};
use std::{io, path::PathBuf, sync::Arc};
use thiserror::Error;

use super::{
    Ack, ChunkStore, MergeEngine, MergeOutcome, StorageLayout, UploadCoordinator,
    VerificationService, VerifyResult,
};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UploadError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Shared state handed to every handler.
#[derive(Clone, Debug)]
pub struct UploadService {
    pub layout: Arc<StorageLayout>,
    pub store: ChunkStore,
    pub coordinator: UploadCoordinator,
    pub merger: MergeEngine,
    pub verifier: VerificationService,
}

impl UploadService {
    /// Build the service around `upload_dir`. The directory itself is created
    /// by the caller at startup.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        let layout = Arc::new(StorageLayout::new(upload_dir));
        let store = ChunkStore::new(layout.clone());
        Self {
            coordinator: UploadCoordinator::new(layout.clone(), store.clone()),
            merger: MergeEngine::new(layout.clone(), store.clone()),
            verifier: VerificationService::new(layout.clone(), store.clone()),
            store,
            layout,
        }
    }

    pub async fn receive_chunk(&self, upload: ChunkUpload) -> UploadResult<Ack> {
        let session = SessionId::parse(&required(upload.file_hash, "fileHash")?)?;
        let label = ChunkLabel::parse(&required(upload.chunk_hash, "hash")?)?;
        let ext = FileExtension::from_filename(&required(upload.filename, "filename")?)?;
        let chunk = upload
            .chunk
            .ok_or_else(|| UploadError::invalid("missing field `chunk`"))?;

        self.coordinator
            .receive_chunk(&session, &label, &ext, &chunk)
            .await
    }

    pub async fn merge(&self, req: MergeRequest) -> UploadResult<MergeOutcome> {
        let session = SessionId::parse(&required(req.file_hash, "fileHash")?)?;
        let ext = FileExtension::from_filename(&required(req.filename, "filename")?)?;
        let chunk_size = req
            .size
            .ok_or_else(|| UploadError::invalid("missing field `size`"))?;

        self.merger.merge(&session, &ext, chunk_size).await
    }

    pub async fn verify(&self, req: VerifyRequest) -> UploadResult<VerifyResult> {
        let session = SessionId::parse(&required(req.file_hash, "fileHash")?)?;
        let ext = FileExtension::from_filename(&required(req.filename, "filename")?)?;

        self.verifier.verify(&session, &ext).await
    }
}

/// Treat absent and empty fields the same way.
fn required(value: Option<String>, name: &str) -> UploadResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(UploadError::invalid(format!("missing field `{name}`"))),
    }
}
