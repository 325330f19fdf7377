//! Accepts chunks one at a time and hands them to the [`ChunkStore`].

use crate::models::chunk::{ChunkLabel, FileExtension, SessionId};
use std::sync::Arc;
use tracing::debug;

use super::{ChunkStore, StorageLayout, UploadResult};

/// Outcome of a single chunk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The chunk is now staged.
    Received,
    /// The completed file already exists; nothing was written.
    AlreadyComplete,
}

impl Ack {
    /// Plain-text body sent back to the browser client.
    pub fn message(&self) -> &'static str {
        match self {
            Ack::Received => "received file chunk",
            Ack::AlreadyComplete => "file exist",
        }
    }
}

#[derive(Clone, Debug)]
pub struct UploadCoordinator {
    layout: Arc<StorageLayout>,
    store: ChunkStore,
}

impl UploadCoordinator {
    pub fn new(layout: Arc<StorageLayout>, store: ChunkStore) -> Self {
        Self { layout, store }
    }

    pub async fn receive_chunk(
        &self,
        session: &SessionId,
        label: &ChunkLabel,
        ext: &FileExtension,
        bytes: &[u8],
    ) -> UploadResult<Ack> {
        if self.layout.final_exists(session, ext).await? {
            debug!(session = %session, label = %label, "file already complete, skipping chunk");
            return Ok(Ack::AlreadyComplete);
        }

        self.store.put(session, label, bytes).await?;
        Ok(Ack::Received)
    }
}
