//! Snapshot and log persistence
//!
//! The snapshot is a full MessagePack array of events, replaced atomically
//! via temp-file-then-rename so readers never observe a partial write. The
//! write-ahead log is a stream of individually packed event records with no
//! extra framing. An advisory file lock on a sidecar protects the snapshot
//! from concurrent writers in other processes.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use serde::Deserialize;

use crate::constants::{LEGACY_FILENAME, LOCK_SUFFIX, SNAPSHOT_FILENAME, WAL_SUFFIX};
use crate::errors::{MemoryError, Result};
use crate::memory::types::MemoryEvent;

/// Resolved on-disk layout for one store
#[derive(Debug, Clone)]
pub struct StorePaths {
    /// Full serialized event array, binary-packed
    pub snapshot: PathBuf,
    /// Append-only log of individually serialized event records
    pub wal: PathBuf,
    /// Zero-byte advisory lock sidecar
    pub lock: PathBuf,
    /// One-time migration source; read-only, never written
    pub legacy: PathBuf,
}

impl StorePaths {
    /// Derive the snapshot/log/lock/legacy layout under a storage directory
    pub fn new(storage_dir: &Path) -> Self {
        let snapshot = storage_dir.join(SNAPSHOT_FILENAME);
        let wal = append_suffix(&snapshot, WAL_SUFFIX);
        let lock = append_suffix(&snapshot, LOCK_SUFFIX);
        let legacy = storage_dir.join(LEGACY_FILENAME);
        Self {
            snapshot,
            wal,
            lock,
            legacy,
        }
    }
}

/// `path` + `.suffix`, keeping the existing extension
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Inter-process advisory lock held for the duration of a snapshot read or
/// write. Cooperative only: observed by processes that also take the lock,
/// not enforced by the OS against strangers.
pub struct SnapshotLock {
    file: File,
}

impl SnapshotLock {
    /// Block until the exclusive lock on the sidecar file is held
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| MemoryError::Storage(format!("open lock file {path:?}: {e}")))?;
        file.lock_exclusive()
            .map_err(|e| MemoryError::Storage(format!("acquire lock {path:?}: {e}")))?;
        Ok(Self { file })
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Write pre-serialized snapshot bytes, replacing any existing snapshot
/// atomically, then retire the write-ahead log.
///
/// Sequence: take the inter-process lock, write a `.tmp` sibling, flush and
/// fsync it, rename over the snapshot path, release the lock, delete the
/// log. A failed log delete is non-fatal — a stale log only means duplicate
/// replay on the next load.
pub fn write_snapshot(packed: &[u8], paths: &StorePaths) -> Result<()> {
    if let Some(parent) = paths.snapshot.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MemoryError::Storage(format!("create dir {parent:?}: {e}")))?;
    }

    {
        let _guard = SnapshotLock::acquire(&paths.lock)?;

        let temp_path = append_suffix(&paths.snapshot, "tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| MemoryError::Storage(format!("create {temp_path:?}: {e}")))?;
        file.write_all(packed)
            .map_err(|e| MemoryError::Storage(format!("write {temp_path:?}: {e}")))?;
        file.flush()
            .map_err(|e| MemoryError::Storage(format!("flush {temp_path:?}: {e}")))?;
        file.sync_all()
            .map_err(|e| MemoryError::Storage(format!("fsync {temp_path:?}: {e}")))?;

        fs::rename(&temp_path, &paths.snapshot).map_err(|e| {
            MemoryError::Storage(format!(
                "rename {temp_path:?} -> {:?}: {e}",
                paths.snapshot
            ))
        })?;
    }

    // Log records up to this point are now covered by the snapshot.
    if paths.wal.exists() {
        if let Err(e) = fs::remove_file(&paths.wal) {
            tracing::warn!(path = ?paths.wal, error = %e, "failed to remove retired log; duplicates possible on next load");
        }
    }

    tracing::debug!(path = ?paths.snapshot, bytes = packed.len(), "snapshot written");
    Ok(())
}

/// Read and decode the snapshot under the inter-process lock.
///
/// Any failure here — unreadable file or undecodable bytes — is reported as
/// `Corruption`; the caller decides how to recover (the engine clears its
/// state and falls back to log replay).
pub fn read_snapshot(paths: &StorePaths) -> Result<Vec<MemoryEvent>> {
    let packed = {
        let _guard = SnapshotLock::acquire(&paths.lock)?;
        let mut file = File::open(&paths.snapshot)
            .map_err(|e| MemoryError::Corruption(format!("open {:?}: {e}", paths.snapshot)))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| MemoryError::Corruption(format!("read {:?}: {e}", paths.snapshot)))?;
        buf
    };

    let events: Vec<MemoryEvent> = rmp_serde::from_slice(&packed)
        .map_err(|e| MemoryError::Corruption(format!("decode {:?}: {e}", paths.snapshot)))?;
    Ok(events)
}

/// Stream-decode the write-ahead log and append every record to `events`.
///
/// Replay is append-only: it does not re-run the recurrence merge, so a log
/// that overlaps the snapshot (possible only after an unclean shutdown)
/// produces duplicate entries rather than losing data. A record that fails
/// to decode ends the replay at that point; everything before it is kept.
pub fn replay_wal(wal_path: &Path, events: &mut Vec<MemoryEvent>) -> Result<usize> {
    let file = File::open(wal_path)
        .map_err(|e| MemoryError::Storage(format!("open log {wal_path:?}: {e}")))?;
    let mut reader = BufReader::new(file);
    let mut decoder = rmp_serde::Deserializer::new(&mut reader);

    let mut count = 0usize;
    loop {
        match MemoryEvent::deserialize(&mut decoder) {
            Ok(event) => {
                events.push(event);
                count += 1;
            }
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref io))
                if io.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                tracing::warn!(path = ?wal_path, error = %e, replayed = count, "log replay stopped early");
                break;
            }
        }
    }
    Ok(count)
}

/// Load the legacy single-file snapshot (plain JSON event array).
///
/// One-shot migration path: consulted only when the current-format snapshot
/// is absent, never written by current code. The store re-persists in the
/// current format on the next save.
pub fn load_legacy(legacy_path: &Path) -> Result<Vec<MemoryEvent>> {
    let run = || -> anyhow::Result<Vec<MemoryEvent>> {
        let file = File::open(legacy_path).context("open legacy file")?;
        let events = serde_json::from_reader(BufReader::new(file)).context("decode legacy file")?;
        Ok(events)
    };
    run().map_err(|e| MemoryError::Storage(format!("legacy load {legacy_path:?}: {e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::EventMetadata;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_events(n: usize) -> Vec<MemoryEvent> {
        (0..n)
            .map(|i| {
                let mut embedding = vec![0.0; 4];
                embedding[i % 4] = 1.0;
                MemoryEvent::new(embedding, EventMetadata::default(), Utc::now())
            })
            .collect()
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let paths = StorePaths::new(dir.path());
        let events = sample_events(3);

        let packed = rmp_serde::to_vec_named(&events).expect("encode");
        write_snapshot(&packed, &paths).expect("write");
        let decoded = read_snapshot(&paths).expect("read");

        assert_eq!(decoded, events);
    }

    #[test]
    fn test_snapshot_write_leaves_no_temp_file() {
        let dir = TempDir::new().expect("tempdir");
        let paths = StorePaths::new(dir.path());
        let packed = rmp_serde::to_vec_named(&sample_events(1)).expect("encode");

        write_snapshot(&packed, &paths).expect("write");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");
    }

    #[test]
    fn test_snapshot_write_removes_wal() {
        let dir = TempDir::new().expect("tempdir");
        let paths = StorePaths::new(dir.path());
        fs::write(&paths.wal, b"stale").expect("seed wal");

        let packed = rmp_serde::to_vec_named(&sample_events(1)).expect("encode");
        write_snapshot(&packed, &paths).expect("write");

        assert!(!paths.wal.exists(), "log should be retired after snapshot");
    }

    #[test]
    fn test_corrupt_snapshot_reports_corruption() {
        let dir = TempDir::new().expect("tempdir");
        let paths = StorePaths::new(dir.path());
        fs::write(&paths.snapshot, b"\xc1 not msgpack").expect("seed garbage");

        let err = read_snapshot(&paths).unwrap_err();
        assert_eq!(err.code(), "CORRUPTION");
    }

    #[test]
    fn test_wal_replay_appends_all_records() {
        let dir = TempDir::new().expect("tempdir");
        let wal = dir.path().join("events.wal");
        let events = sample_events(4);

        let mut stream = Vec::new();
        for event in &events {
            stream.extend(rmp_serde::to_vec_named(event).expect("encode"));
        }
        fs::write(&wal, &stream).expect("seed wal");

        let mut replayed = Vec::new();
        let count = replay_wal(&wal, &mut replayed).expect("replay");
        assert_eq!(count, 4);
        assert_eq!(replayed, events);
    }

    #[test]
    fn test_wal_replay_keeps_prefix_on_truncated_tail() {
        let dir = TempDir::new().expect("tempdir");
        let wal = dir.path().join("events.wal");
        let events = sample_events(2);

        let mut stream = Vec::new();
        for event in &events {
            stream.extend(rmp_serde::to_vec_named(event).expect("encode"));
        }
        // Chop the final record in half, as a crash mid-append would.
        stream.truncate(stream.len() - 7);
        fs::write(&wal, &stream).expect("seed wal");

        let mut replayed = Vec::new();
        let count = replay_wal(&wal, &mut replayed).expect("replay");
        assert_eq!(count, 1);
        assert_eq!(replayed[0], events[0]);
    }

    #[test]
    fn test_legacy_json_load() {
        let dir = TempDir::new().expect("tempdir");
        let legacy = dir.path().join(LEGACY_FILENAME);
        let events = sample_events(2);
        fs::write(&legacy, serde_json::to_vec(&events).expect("encode")).expect("seed legacy");

        let decoded = load_legacy(&legacy).expect("load");
        assert_eq!(decoded, events);
    }

    #[test]
    fn test_store_paths_layout() {
        let paths = StorePaths::new(Path::new("/data/astra"));
        assert_eq!(
            paths.snapshot,
            Path::new("/data/astra").join(SNAPSHOT_FILENAME)
        );
        assert!(paths.wal.to_string_lossy().ends_with(".msgpack.wal"));
        assert!(paths.lock.to_string_lossy().ends_with(".msgpack.lock"));
        assert!(paths.legacy.to_string_lossy().ends_with(".json"));
    }
}
