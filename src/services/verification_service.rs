//! Answers "should the client upload, and what is already here?".

use crate::models::chunk::{ChunkLabel, FileExtension, SessionId};
use std::sync::Arc;

use super::{ChunkStore, StorageLayout, UploadResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    pub should_upload: bool,
    /// Staged labels in index order. Empty when `should_upload` is false.
    pub uploaded_chunk_labels: Vec<ChunkLabel>,
}

#[derive(Clone, Debug)]
pub struct VerificationService {
    layout: Arc<StorageLayout>,
    store: ChunkStore,
}

impl VerificationService {
    pub fn new(layout: Arc<StorageLayout>, store: ChunkStore) -> Self {
        Self { layout, store }
    }

    pub async fn verify(&self, session: &SessionId, ext: &FileExtension) -> UploadResult<VerifyResult> {
        if self.layout.final_exists(session, ext).await? {
            return Ok(VerifyResult {
                should_upload: false,
                uploaded_chunk_labels: Vec::new(),
            });
        }

        let mut labels = self.store.list(session).await?;
        labels.sort();
        Ok(VerifyResult {
            should_upload: true,
            uploaded_chunk_labels: labels,
        })
    }
}
