//! Bucket state storage backends

use crate::error::Result;
use crate::types::BucketState;
use fd_lock::RwLock;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Storage for bucket state that can run an atomic read-modify-write transaction
///
/// Implementations are called from a blocking thread, so they may block on locks or disk.
pub trait BucketStore: Send + Sync {
    /// Run `update` against the current state and persist the result before returning
    fn transact(&self, update: &mut dyn FnMut(&mut BucketState)) -> Result<()>;
}

/// Bucket state held in process memory, shared between threads
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    state: Mutex<BucketState>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketStore for MemoryBucketStore {
    fn transact(&self, update: &mut dyn FnMut(&mut BucketState)) -> Result<()> {
        // A poisoned lock still holds a usable state; the logs are append/prune only
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut state);
        Ok(())
    }
}

/// Bucket state persisted as JSON and guarded by an exclusive advisory file lock
///
/// Every process pointing at the same path shares one set of buckets.
#[derive(Debug, Clone)]
pub struct FileBucketStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileBucketStore {
    /// Store state at `path`, locking a sibling file with a `.lock` extension
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    /// Store state at `path`, using a custom lock file
    pub fn with_lock_path(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> BucketState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BucketState::default(),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read bucket state, starting empty");
                return BucketState::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Corrupt bucket state, starting empty");
                BucketState::default()
            }
        }
    }

    fn write_state(&self, state: &BucketState) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_vec(state)?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl BucketStore for FileBucketStore {
    fn transact(&self, update: &mut dyn FnMut(&mut BucketState)) -> Result<()> {
        for parent in [self.path.parent(), self.lock_path.parent()].into_iter().flatten() {
            fs::create_dir_all(parent)?;
        }

        let file: File = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        let mut lock = RwLock::new(file);

        // Blocks until no other process holds the lock; released when the guard drops
        let _guard = lock.write()?;
        let mut state = self.read_state();
        update(&mut state);
        self.write_state(&state)?;
        debug!(path = ?self.path, "Updated bucket state");
        Ok(())
    }
}
