//! Write-ahead log batching
//!
//! Decouples per-event durability cost from the write hot path: serialized
//! records accumulate in memory and hit disk one batch at a time. The log
//! file is the crash-recovery source of truth between snapshots.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::errors::{MemoryError, Result};

/// Batching buffer in front of the append-only log file.
///
/// Bounded durability by design: records reach the OS buffer on flush but
/// are not fsynced, and up to one batch can be lost on a crash between
/// flushes. `save()` on the store drains the buffer and then retires the
/// log entirely by snapshotting.
pub struct WriteBatcher {
    path: PathBuf,
    batch_size: usize,
    buffer: Mutex<Vec<Vec<u8>>>,
}

impl WriteBatcher {
    /// Create a batcher appending to `path`, flushing automatically once
    /// `batch_size` records are buffered
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size: batch_size.max(1),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Log file path this batcher appends to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer one serialized record; flush if the batch is full.
    ///
    /// A flush triggered here can fail; the error propagates and the
    /// swapped-out records are gone from the buffer (they survive only in
    /// the in-memory store until the next snapshot).
    pub async fn add(&self, record: Vec<u8>) -> Result<()> {
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(record);
            buffer.len() >= self.batch_size
        };

        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Append all buffered records to the log file.
    ///
    /// The buffer is swapped out under the lock; the disk append happens
    /// outside it, so log I/O never contends with concurrent buffering.
    /// Data is flushed to the OS buffer, not fsynced.
    pub async fn flush(&self) -> Result<()> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };

        let data = batch.concat();
        let count = batch.len();

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("open log {:?}: {e}", self.path)))?;
        file.write_all(&data)
            .await
            .map_err(|e| MemoryError::Storage(format!("append log {:?}: {e}", self.path)))?;
        file.flush()
            .await
            .map_err(|e| MemoryError::Storage(format!("flush log {:?}: {e}", self.path)))?;

        tracing::debug!(records = count, bytes = data.len(), "flushed log batch");
        Ok(())
    }

    /// Number of records currently buffered (not yet on disk)
    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_add_buffers_until_batch_size() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("events.wal");
        let batcher = WriteBatcher::new(&path, 3);

        batcher.add(b"one".to_vec()).await.expect("add");
        batcher.add(b"two".to_vec()).await.expect("add");
        assert_eq!(batcher.pending().await, 2);
        assert!(!path.exists(), "nothing should hit disk below batch size");

        batcher.add(b"three".to_vec()).await.expect("add");
        assert_eq!(batcher.pending().await, 0);
        let contents = std::fs::read(&path).expect("read log");
        assert_eq!(contents, b"onetwothree");
    }

    #[tokio::test]
    async fn test_explicit_flush_drains_partial_batch() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("events.wal");
        let batcher = WriteBatcher::new(&path, 100);

        batcher.add(b"solo".to_vec()).await.expect("add");
        batcher.flush().await.expect("flush");

        assert_eq!(batcher.pending().await, 0);
        assert_eq!(std::fs::read(&path).expect("read log"), b"solo");
    }

    #[tokio::test]
    async fn test_flush_appends_across_batches() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("events.wal");
        let batcher = WriteBatcher::new(&path, 1);

        batcher.add(b"a".to_vec()).await.expect("add");
        batcher.add(b"b".to_vec()).await.expect("add");

        assert_eq!(std::fs::read(&path).expect("read log"), b"ab");
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("events.wal");
        let batcher = WriteBatcher::new(&path, 10);

        batcher.flush().await.expect("flush");
        assert!(!path.exists());
    }
}
