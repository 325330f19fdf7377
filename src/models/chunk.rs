//! Identifiers that end up as path components under the upload root.
//!
//! Every value here is validated on construction, so code holding one can
//! join it onto a directory without re-checking for traversal.

use crate::services::{UploadError, UploadResult};
use std::{cmp::Ordering, fmt, str::FromStr};

const MAX_SESSION_ID_LEN: usize = 128;
const MAX_LABEL_LEN: usize = 200;
const MAX_EXTENSION_LEN: usize = 16;

/// Content hash of a whole file. Names the staging directory and the final file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> UploadResult<Self> {
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return Err(UploadError::invalid(format!(
                "fileHash must be between 1 and {MAX_SESSION_ID_LEN} characters"
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(UploadError::invalid(
                "fileHash may only contain letters, digits, `-` and `_`",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of one staged chunk: an opaque prefix and the chunk index, joined by
/// the last `-` (`<fileHash>-<index>` in practice).
///
/// Ordering compares the numeric index first, so `x-2` sorts before `x-10`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkLabel {
    raw: String,
    index: u64,
}

impl ChunkLabel {
    pub fn parse(raw: &str) -> UploadResult<Self> {
        if raw.is_empty() || raw.len() > MAX_LABEL_LEN {
            return Err(UploadError::invalid(format!(
                "chunk hash must be between 1 and {MAX_LABEL_LEN} characters"
            )));
        }
        // A leading dot would collide with the store's hidden temp files.
        if raw.starts_with('.')
            || raw.contains("..")
            || !raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        {
            return Err(UploadError::invalid(format!(
                "chunk hash `{raw}` is not a safe file name"
            )));
        }

        let index = raw
            .rsplit_once('-')
            .and_then(|(_, suffix)| {
                if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                    suffix.parse::<u64>().ok()
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                UploadError::invalid(format!("chunk hash `{raw}` does not end in `-<index>`"))
            })?;

        Ok(Self {
            raw: raw.to_string(),
            index,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ChunkLabel {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChunkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for ChunkLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for ChunkLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Extension of the original file name, including the leading dot.
/// Empty when the name has no dot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn from_filename(filename: &str) -> UploadResult<Self> {
        let Some(pos) = filename.rfind('.') else {
            return Ok(Self::default());
        };
        let ext = &filename[pos + 1..];
        if ext.len() > MAX_EXTENSION_LEN || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(UploadError::invalid(format!(
                "filename `{filename}` has an unsupported extension"
            )));
        }
        Ok(Self(filename[pos..].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
