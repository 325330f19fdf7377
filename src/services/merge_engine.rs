//! Reassembles staged chunks into the completed file.
//!
//! Chunks are written into `<final>.part` at `index * chunk_size`, each by
//! its own task, at most [`MAX_PARALLEL_COPIES`] at a time. The ranges are
//! disjoint, so the tasks share the file without locking. Every task must
//! finish (data synced, source deleted) before the `.part` file is trimmed to
//! its exact length, promoted, and the staging directory dropped. If anything
//! fails, both the `.part` file and the remaining chunks stay on disk and the
//! merge can simply be called again: rewriting an offset with the same bytes
//! is harmless.

use crate::models::chunk::{FileExtension, SessionId};
use std::{
    io::SeekFrom,
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncSeekExt, AsyncWriteExt},
    sync::Semaphore,
    task::JoinSet,
};
use tracing::{error, info};

use super::{ChunkStore, StagedChunk, StorageLayout, UploadError, UploadResult};

/// Each copy holds two file handles open, so this bounds the fds one merge uses.
pub const MAX_PARALLEL_COPIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Chunks were written and the completed file promoted.
    Merged { size: u64, chunks: usize },
    /// The completed file was already there.
    AlreadyComplete,
}

#[derive(Clone, Debug)]
pub struct MergeEngine {
    layout: Arc<StorageLayout>,
    store: ChunkStore,
}

impl MergeEngine {
    pub fn new(layout: Arc<StorageLayout>, store: ChunkStore) -> Self {
        Self { layout, store }
    }

    pub async fn merge(
        &self,
        session: &SessionId,
        ext: &FileExtension,
        chunk_size: u64,
    ) -> UploadResult<MergeOutcome> {
        if self.layout.final_exists(session, ext).await? {
            // A crash between promotion and cleanup leaves the staging dir behind.
            self.store.remove_all(session).await?;
            return Ok(MergeOutcome::AlreadyComplete);
        }

        if chunk_size == 0 {
            return Err(UploadError::invalid("size must be greater than zero"));
        }

        let merge_path = self.layout.merge_path(session, ext);
        let resuming = fs::try_exists(&merge_path).await?;

        let mut chunks = self.store.staged(session).await?;
        chunks.sort_by(|a, b| a.label.cmp(&b.label));
        check_layout(&chunks, chunk_size, resuming)?;

        info!(
            session = %session,
            chunks = chunks.len(),
            chunk_size,
            resuming,
            "merging chunks"
        );

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&merge_path)
            .await?;

        let chunk_count = chunks.len();
        let known_len = merged_len(&chunks, chunk_size, resuming);
        let permits = Arc::new(Semaphore::new(MAX_PARALLEL_COPIES));
        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let permit = permits.clone().acquire_owned().await.map_err(|err| {
                UploadError::Io(std::io::Error::other(format!("copy limiter closed: {err}")))
            })?;
            let source = self.store.chunk_path(session, &chunk.label);
            let target = merge_path.clone();
            let offset = chunk.label.index() * chunk_size;
            tasks.spawn(async move {
                let _permit = permit;
                copy_chunk(source, target, offset).await
            });
        }

        // Drain every task before deciding anything: nothing may touch the
        // staging dir while a copy is still in flight.
        let mut failure: Option<UploadError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|err| {
                UploadError::Io(std::io::Error::other(format!("chunk copy task failed: {err}")))
            });
            if let Err(err) = result.and_then(|copied| copied) {
                error!(session = %session, error = %err, "chunk copy failed");
                failure.get_or_insert(err);
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let merged = OpenOptions::new().write(true).open(&merge_path).await?;
        let size = match known_len {
            Some(len) => {
                merged.set_len(len).await?;
                len
            }
            None => merged.metadata().await?.len(),
        };
        merged.sync_all().await?;
        drop(merged);

        let final_path = self.layout.final_path(session, ext);
        fs::rename(&merge_path, &final_path).await?;
        self.store.remove_all(session).await?;

        info!(
            session = %session,
            size,
            path = %final_path.display(),
            "file merged"
        );
        Ok(MergeOutcome::Merged {
            size,
            chunks: chunk_count,
        })
    }
}

/// Reject staging states that would produce a file with holes or overlaps.
///
/// `chunks` must be sorted by index. When `resuming`, lower chunks may
/// already have been consumed into the `.part` file.
fn check_layout(chunks: &[StagedChunk], chunk_size: u64, resuming: bool) -> UploadResult<()> {
    if chunks.is_empty() {
        return if resuming {
            Ok(())
        } else {
            Err(UploadError::invalid("no chunks have been uploaded for this file"))
        };
    }

    for pair in chunks.windows(2) {
        if pair[0].label.index() == pair[1].label.index() {
            return Err(UploadError::invalid(format!(
                "chunks `{}` and `{}` share index {}",
                pair[0].label,
                pair[1].label,
                pair[0].label.index()
            )));
        }
    }

    if !resuming {
        if let Some((position, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(position, chunk)| chunk.label.index() != *position as u64)
        {
            return Err(UploadError::invalid(format!(
                "chunk {} is missing (next staged chunk is `{}`)",
                position, chunk.label
            )));
        }
    }

    let last = chunks.len() - 1;
    for (position, chunk) in chunks.iter().enumerate() {
        let fits = if position == last {
            chunk.len <= chunk_size
        } else {
            chunk.len == chunk_size
        };
        if !fits {
            return Err(UploadError::invalid(format!(
                "chunk `{}` is {} bytes, which does not match size {}",
                chunk.label, chunk.len, chunk_size
            )));
        }
        if chunk.label.index().checked_mul(chunk_size).is_none() {
            return Err(UploadError::invalid(format!(
                "chunk `{}` offset overflows",
                chunk.label
            )));
        }
    }

    Ok(())
}

/// Exact length of the merged file, when the staged chunks determine it.
///
/// The tail chunk is the highest index on a fresh merge, or any chunk shorter
/// than `chunk_size`. When resuming with only full chunks left, the tail may
/// already be in the `.part` file, so its current length has to stand.
fn merged_len(chunks: &[StagedChunk], chunk_size: u64, resuming: bool) -> Option<u64> {
    let last = chunks.last()?;
    if resuming && last.len == chunk_size {
        return None;
    }
    Some(last.label.index() * chunk_size + last.len)
}

/// Copy one chunk into `target` at `offset`, sync it, then delete the source.
async fn copy_chunk(source: PathBuf, target: PathBuf, offset: u64) -> UploadResult<u64> {
    let mut input = File::open(&source).await?;
    let mut output = OpenOptions::new().write(true).open(&target).await?;
    output.seek(SeekFrom::Start(offset)).await?;
    let copied = tokio::io::copy(&mut input, &mut output).await?;
    output.flush().await?;
    output.sync_data().await?;
    drop(input);
    drop(output);

    fs::remove_file(&source).await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::ChunkLabel;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        layout: Arc<StorageLayout>,
        store: ChunkStore,
        engine: MergeEngine,
        session: SessionId,
        ext: FileExtension,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = Arc::new(StorageLayout::new(dir.path()));
        let store = ChunkStore::new(layout.clone());
        let engine = MergeEngine::new(layout.clone(), store.clone());
        Fixture {
            _dir: dir,
            layout,
            store,
            engine,
            session: SessionId::parse("beef").unwrap(),
            ext: FileExtension::from_filename("data.bin").unwrap(),
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn stage(fx: &Fixture, data: &[u8], chunk_size: usize, indices: &[usize]) {
        for &index in indices {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(data.len());
            let label = ChunkLabel::parse(&format!("beef-{index}")).unwrap();
            fx.store.put(&fx.session, &label, &data[start..end]).await.unwrap();
        }
    }

    #[tokio::test]
    async fn merges_in_numeric_order() {
        let fx = fixture();
        let data = sample(13 * 7 - 3);
        stage(&fx, &data, 7, &(0..13).rev().collect::<Vec<_>>()).await;

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 7).await.unwrap();

        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                size: data.len() as u64,
                chunks: 13
            }
        );
        let merged = std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap();
        assert_eq!(merged, data);
        assert!(!fx.layout.staging_dir(&fx.session).exists());
        assert!(!fx.layout.merge_path(&fx.session, &fx.ext).exists());
    }

    #[tokio::test]
    async fn second_merge_is_a_no_op() {
        let fx = fixture();
        let data = sample(40);
        stage(&fx, &data, 16, &[0, 1, 2]).await;

        fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap();
        let again = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap();

        assert_eq!(again, MergeOutcome::AlreadyComplete);
        let merged = std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap();
        assert_eq!(merged, data);
    }

    #[tokio::test]
    async fn missing_chunk_leaves_staging_untouched() {
        let fx = fixture();
        let data = sample(40);
        stage(&fx, &data, 16, &[0, 2]).await;

        let err = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidRequest(_)));
        assert_eq!(fx.store.list(&fx.session).await.unwrap().len(), 2);
        assert!(!fx.layout.merge_path(&fx.session, &fx.ext).exists());
        assert!(!fx.layout.final_path(&fx.session, &fx.ext).exists());
    }

    #[tokio::test]
    async fn rejects_chunks_that_do_not_match_size() {
        let fx = fixture();
        let data = sample(40);
        stage(&fx, &data, 16, &[0, 1, 2]).await;

        let err = fx.engine.merge(&fx.session, &fx.ext, 10).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));

        let err = fx.engine.merge(&fx.session, &fx.ext, 0).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));

        assert_eq!(fx.store.list(&fx.session).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn nothing_staged_is_rejected() {
        let fx = fixture();
        let err = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));
        assert!(!fx.layout.final_path(&fx.session, &fx.ext).exists());
    }

    #[tokio::test]
    async fn resumes_an_interrupted_merge() {
        let fx = fixture();
        let data = sample(40);
        // First chunk was copied and deleted before the process died.
        std::fs::write(fx.layout.merge_path(&fx.session, &fx.ext), &data[..16]).unwrap();
        stage(&fx, &data, 16, &[1, 2]).await;

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap();

        assert_eq!(outcome, MergeOutcome::Merged { size: 40, chunks: 2 });
        let merged = std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap();
        assert_eq!(merged, data);
    }

    #[tokio::test]
    async fn promotes_part_file_when_every_chunk_was_consumed() {
        let fx = fixture();
        let data = sample(40);
        std::fs::write(fx.layout.merge_path(&fx.session, &fx.ext), &data).unwrap();
        std::fs::create_dir_all(fx.layout.staging_dir(&fx.session)).unwrap();

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap();

        assert_eq!(outcome, MergeOutcome::Merged { size: 40, chunks: 0 });
        assert!(!fx.layout.staging_dir(&fx.session).exists());
    }

    #[tokio::test]
    async fn stale_staging_is_cleared_once_file_exists() {
        let fx = fixture();
        std::fs::write(fx.layout.final_path(&fx.session, &fx.ext), b"done").unwrap();
        stage(&fx, &sample(8), 8, &[0]).await;

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 8).await.unwrap();

        assert_eq!(outcome, MergeOutcome::AlreadyComplete);
        assert!(!fx.layout.staging_dir(&fx.session).exists());
        assert_eq!(
            std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap(),
            b"done"
        );
    }

    #[tokio::test]
    async fn zero_size_on_completed_file_is_already_complete() {
        let fx = fixture();
        std::fs::write(fx.layout.final_path(&fx.session, &fx.ext), b"done").unwrap();

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 0).await.unwrap();

        assert_eq!(outcome, MergeOutcome::AlreadyComplete);
    }

    #[tokio::test]
    async fn oversized_part_file_is_trimmed_to_the_tail_chunk() {
        let fx = fixture();
        let data = sample(40);
        // Leftover from an earlier attempt with a longer layout.
        let mut stale = data[..16].to_vec();
        stale.resize(64, 0xAA);
        std::fs::write(fx.layout.merge_path(&fx.session, &fx.ext), &stale).unwrap();
        stage(&fx, &data, 16, &[1, 2]).await;

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap();

        assert_eq!(outcome, MergeOutcome::Merged { size: 40, chunks: 2 });
        let merged = std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap();
        assert_eq!(merged, data);
    }

    #[tokio::test]
    async fn resumed_merge_keeps_tail_already_in_part_file() {
        let fx = fixture();
        let data = sample(40);
        // Chunks 0 and 2 landed before the crash; only the full chunk 1 remains.
        let mut part = data.clone();
        part[16..32].fill(0);
        std::fs::write(fx.layout.merge_path(&fx.session, &fx.ext), &part).unwrap();
        stage(&fx, &data, 16, &[1]).await;

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 16).await.unwrap();

        assert_eq!(outcome, MergeOutcome::Merged { size: 40, chunks: 1 });
        let merged = std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap();
        assert_eq!(merged, data);
    }

    #[tokio::test]
    async fn merges_more_chunks_than_parallel_copies() {
        let fx = fixture();
        let count = 3000;
        assert!(count > MAX_PARALLEL_COPIES);
        let data = sample(count * 4 - 1);
        stage(&fx, &data, 4, &(0..count).collect::<Vec<_>>()).await;

        let outcome = fx.engine.merge(&fx.session, &fx.ext, 4).await.unwrap();

        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                size: data.len() as u64,
                chunks: count
            }
        );
        let merged = std::fs::read(fx.layout.final_path(&fx.session, &fx.ext)).unwrap();
        assert!(merged == data, "merged bytes differ from staged chunks");
        assert!(!fx.layout.staging_dir(&fx.session).exists());
    }
}
