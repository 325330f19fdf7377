//! On-disk layout beneath the upload root.
//!
//! ```text
//! <root>/<fileHash>/<chunkLabel>     staged chunk
//! <root>/<fileHash><ext>             completed file
//! <root>/<fileHash><ext>.part        merge in progress
//! ```
//!
//! Session ids never contain `.`, so a completed file or merge file can not
//! collide with another session's staging directory.

use crate::models::chunk::{ChunkLabel, FileExtension, SessionId};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::UploadResult;

/// Suffix used for files whose original name had no extension, so the
/// completed file never shares a path with its own staging directory.
const BARE_EXTENSION: &str = ".bin";
const MERGE_SUFFIX: &str = ".part";

#[derive(Clone, Debug)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    pub fn chunk_path(&self, session: &SessionId, label: &ChunkLabel) -> PathBuf {
        self.staging_dir(session).join(label.as_str())
    }

    pub fn final_path(&self, session: &SessionId, ext: &FileExtension) -> PathBuf {
        self.root.join(self.final_name(session, ext))
    }

    pub fn merge_path(&self, session: &SessionId, ext: &FileExtension) -> PathBuf {
        self.root
            .join(format!("{}{}", self.final_name(session, ext), MERGE_SUFFIX))
    }

    /// Whether the completed file for this session is already in place.
    pub async fn final_exists(&self, session: &SessionId, ext: &FileExtension) -> UploadResult<bool> {
        Ok(fs::try_exists(self.final_path(session, ext)).await?)
    }

    fn final_name(&self, session: &SessionId, ext: &FileExtension) -> String {
        let ext = match ext.as_str() {
            "" => BARE_EXTENSION,
            other => other,
        };
        format!("{}{}", session, ext)
    }
}
