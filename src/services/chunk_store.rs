//! Filesystem persistence for staged chunks.
//!
//! Each session gets its own staging directory, created on the first `put`.
//! Chunks are written to a temp file in that directory, fsynced, then renamed
//! over the label, so a label on disk always holds a complete chunk.

use crate::models::chunk::{ChunkLabel, SessionId};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use super::{StorageLayout, UploadResult};

const TEMP_PREFIX: &str = ".tmp-";

/// A chunk currently sitting in a staging directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedChunk {
    pub label: ChunkLabel,
    pub len: u64,
}

#[derive(Clone, Debug)]
pub struct ChunkStore {
    layout: Arc<StorageLayout>,
}

impl ChunkStore {
    pub fn new(layout: Arc<StorageLayout>) -> Self {
        Self { layout }
    }

    pub fn chunk_path(&self, session: &SessionId, label: &ChunkLabel) -> PathBuf {
        self.layout.chunk_path(session, label)
    }

    /// Store `bytes` under `label`, replacing any earlier copy of the same chunk.
    pub async fn put(&self, session: &SessionId, label: &ChunkLabel, bytes: &[u8]) -> UploadResult<()> {
        let dir = self.layout.staging_dir(session);
        fs::create_dir_all(&dir).await?;

        let tmp_path = dir.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        if let Err(err) = write_synced(&tmp_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        let chunk_path = self.layout.chunk_path(session, label);
        if let Err(err) = fs::rename(&tmp_path, &chunk_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&chunk_path).await?;
                fs::rename(&tmp_path, &chunk_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        debug!(
            session = %session,
            label = %label,
            bytes = bytes.len(),
            "stored chunk"
        );
        Ok(())
    }

    /// Labels currently staged for `session`, in no particular order.
    pub async fn list(&self, session: &SessionId) -> UploadResult<Vec<ChunkLabel>> {
        Ok(self
            .staged(session)
            .await?
            .into_iter()
            .map(|chunk| chunk.label)
            .collect())
    }

    /// Staged chunks with their on-disk length. Temp files and names that
    /// are not chunk labels are skipped.
    pub async fn staged(&self, session: &SessionId) -> UploadResult<Vec<StagedChunk>> {
        let dir = self.layout.staging_dir(session);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let label = match ChunkLabel::parse(name) {
                Ok(label) => label,
                Err(_) => {
                    debug!("ignoring stray entry {} in {}", name, dir.display());
                    continue;
                }
            };
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            chunks.push(StagedChunk {
                label,
                len: meta.len(),
            });
        }

        Ok(chunks)
    }

    /// Drop the staging directory and everything in it. Absent is fine.
    pub async fn remove_all(&self, session: &SessionId) -> UploadResult<()> {
        let dir = self.layout.staging_dir(session);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("removed staging directory {}", dir.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

async fn write_synced(path: &std::path::Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}
