//! What the browser side does before talking to the server: split the file
//! into fixed-size ranges, label them, and hash the whole content.
//!
//! The hash is a plain sequential fold over the chunks; each step reports
//! progress so a UI can show it.

use sha2::{Digest, Sha256};
use std::ops::Range;

use crate::services::{UploadError, UploadResult};

/// Byte ranges of each chunk, in order. The last range may be shorter.
pub fn plan_chunks(total_len: u64, chunk_size: u64) -> UploadResult<Vec<Range<u64>>> {
    if chunk_size == 0 {
        return Err(UploadError::invalid("chunk size must be greater than zero"));
    }
    let mut ranges = Vec::with_capacity(total_len.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < total_len {
        let end = start.saturating_add(chunk_size).min(total_len);
        ranges.push(start..end);
        start = end;
    }
    Ok(ranges)
}

/// Label for chunk `index` of the file with `content_hash`.
pub fn chunk_label(content_hash: &str, index: usize) -> String {
    format!("{content_hash}-{index}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    /// Matches spark-md5 based browser clients.
    Md5,
}

enum HashState {
    Sha256(Sha256),
    Md5(md5::Context),
}

/// Running content hash over a known number of chunks.
pub struct ContentHasher {
    state: HashState,
    total_chunks: usize,
    digested: usize,
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm, total_chunks: usize) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HashState::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => HashState::Md5(md5::Context::new()),
        };
        Self {
            state,
            total_chunks,
            digested: 0,
        }
    }

    /// Feed the next chunk and return overall progress in percent.
    pub fn update(&mut self, chunk: &[u8]) -> f64 {
        match &mut self.state {
            HashState::Sha256(hasher) => hasher.update(chunk),
            HashState::Md5(ctx) => ctx.consume(chunk),
        }
        self.digested += 1;
        self.progress()
    }

    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 || self.digested >= self.total_chunks {
            100.0
        } else {
            self.digested as f64 * 100.0 / self.total_chunks as f64
        }
    }

    /// Lowercase hex digest.
    pub fn finish(self) -> String {
        match self.state {
            HashState::Sha256(hasher) => hex::encode(hasher.finalize()),
            HashState::Md5(ctx) => format!("{:x}", ctx.compute()),
        }
    }
}

/// Hash `chunks` in order, calling `on_progress` after each one.
pub fn hash_chunks<'a, I, F>(algorithm: HashAlgorithm, chunks: I, mut on_progress: F) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
    I::IntoIter: ExactSizeIterator,
    F: FnMut(f64),
{
    let chunks = chunks.into_iter();
    let hasher = ContentHasher::new(algorithm, chunks.len());
    chunks
        .fold(hasher, |mut hasher, chunk| {
            on_progress(hasher.update(chunk));
            hasher
        })
        .finish()
}
