//! Snapshot persistence.
//!
//! A state directory holds the encoded snapshot and an advisory lock:
//!
//! ```text
//! <state_dir>/
//! ├─ snapshot.bin      # Encoded snapshot
//! └─ LOCK              # Advisory lock for single-writer
//! ```

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use parivaha_model::Snapshot;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const SNAPSHOT_FILE: &str = "snapshot.bin";
const SNAPSHOT_TEMP: &str = "snapshot.bin.tmp";
const LOCK_FILE: &str = "LOCK";

/// Durable storage for the sync snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Loads the last committed snapshot, or an empty one if none exists.
    fn load(&self) -> SyncResult<Snapshot>;

    /// Replaces the committed snapshot. Must be all-or-nothing.
    fn commit(&self, snapshot: &Snapshot) -> SyncResult<()>;
}

/// An in-memory snapshot store for testing.
///
/// Stores the encoded bytes so that decoding is exercised on every load.
#[derive(Default)]
pub struct MemorySnapshotStore {
    bytes: RwLock<Option<Vec<u8>>>,
    commits: AtomicU64,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// The committed bytes, if any.
    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.bytes.read().clone()
    }

    /// Overwrites the stored bytes verbatim.
    pub fn set_bytes(&self, bytes: Vec<u8>) {
        *self.bytes.write() = Some(bytes);
    }

    /// Flips one byte of the stored payload so the next load fails.
    pub fn corrupt(&self) {
        if let Some(bytes) = self.bytes.write().as_mut() {
            if let Some(b) = bytes.get_mut(12) {
                *b ^= 0xff;
            }
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> SyncResult<Snapshot> {
        match self.bytes.read().as_deref() {
            Some(bytes) => Ok(Snapshot::decode(bytes)?),
            None => Ok(Snapshot::new()),
        }
    }

    fn commit(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let bytes = snapshot.encode()?;
        *self.bytes.write() = Some(bytes);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A file-backed snapshot store.
///
/// Holds an exclusive lock on the state directory for its lifetime, so two
/// processes cannot sync the same vault at once.
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    _lock_file: File,
}

impl FileSnapshotStore {
    /// Opens (creating if needed) the state directory and takes its lock.
    ///
    /// Returns [`SyncError::PassInProgress`] if another process holds it.
    pub fn open(path: &Path) -> SyncResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(SyncError::Config(format!(
                "state path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::PassInProgress);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The state directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_FILE)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> SyncResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> SyncResult<()> {
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> SyncResult<Snapshot> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(Snapshot::new());
        }

        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(Snapshot::new());
        }
        Ok(Snapshot::decode(&data)?)
    }

    /// Write-then-rename: temp file, fsync, rename, fsync directory.
    fn commit(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let data = snapshot.encode()?;
        let temp_path = self.path.join(SNAPSHOT_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.snapshot_path())?;
        self.sync_directory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parivaha_model::{PairKey, Revision, SyncPair};
    use tempfile::tempdir;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(SyncPair::new(
            PairKey::new("n1", "a.md"),
            Revision::Counter(1),
            Revision::Tag("abc".into()),
            Utc::now(),
        ));
        snapshot
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().unwrap().is_empty());

        store.commit(&snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), snapshot());
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn memory_store_corruption() {
        let store = MemorySnapshotStore::new();
        store.commit(&snapshot()).unwrap();
        store.corrupt();
        assert!(matches!(store.load(), Err(SyncError::SnapshotCorruption(_))));
    }

    #[test]
    fn file_store_round_trip() {
        let temp = tempdir().unwrap();
        let state = temp.path().join(".parivaha");

        let store = FileSnapshotStore::open(&state).unwrap();
        assert!(store.load().unwrap().is_empty());
        store.commit(&snapshot()).unwrap();
        assert!(store.snapshot_path().exists());
        assert!(!state.join(SNAPSHOT_TEMP).exists());
        drop(store);

        let reopened = FileSnapshotStore::open(&state).unwrap();
        assert_eq!(reopened.load().unwrap(), snapshot());
    }

    #[test]
    fn file_store_commit_is_byte_identical() {
        let temp = tempdir().unwrap();
        let store = FileSnapshotStore::open(temp.path()).unwrap();
        store.commit(&snapshot()).unwrap();
        let first = fs::read(store.snapshot_path()).unwrap();
        store.commit(&store.load().unwrap()).unwrap();
        assert_eq!(fs::read(store.snapshot_path()).unwrap(), first);
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _store = FileSnapshotStore::open(temp.path()).unwrap();
        assert!(matches!(
            FileSnapshotStore::open(temp.path()),
            Err(SyncError::PassInProgress)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _store = FileSnapshotStore::open(temp.path()).unwrap();
        }
        assert!(FileSnapshotStore::open(temp.path()).is_ok());
    }

    #[test]
    fn corrupted_file_is_reported() {
        let temp = tempdir().unwrap();
        let store = FileSnapshotStore::open(temp.path()).unwrap();
        fs::write(store.snapshot_path(), b"PVSN garbage").unwrap();
        assert!(matches!(store.load(), Err(SyncError::SnapshotCorruption(_))));
    }
}
