//! Narrow interface over the OS file primitives the log engine depends on:
//! advisory exclusive locks, space preallocation, and flush-to-stable-storage
//! with a latency warning.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::BinlogError;

/// Sync latency above which a warning is logged.
const SLOW_SYNC_THRESHOLD: Duration = Duration::from_secs(1);

/// A file held under an OS advisory exclusive lock.
///
/// The lock is the sole mechanism preventing two writers from appending to
/// the same segment. Dropping the handle releases the lock with the
/// descriptor; `close` releases it explicitly so failures can be reported.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    /// Creates (or opens) the file read-write and takes the lock, blocking
    /// until it is available. Existing contents are preserved.
    pub fn create(path: &Path) -> Result<Self, BinlogError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing file read-write and blocks for the lock.
    pub fn open_rw(path: &Path) -> Result<Self, BinlogError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing file read-write without blocking; fails with
    /// `LockHeld` when another process owns the lock.
    pub fn try_open_rw(path: &Path) -> Result<Self, BinlogError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                BinlogError::LockHeld(path.to_path_buf())
            } else {
                BinlogError::Io(e)
            }
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Preallocates disk space up to `size` bytes, extending the file
    /// length. Shorter files grow to `size` and the added range reads as
    /// zeros; longer files are left alone.
    pub fn preallocate(&self, size: u64) -> io::Result<()> {
        if self.file.metadata()?.len() >= size {
            return Ok(());
        }
        self.file.allocate(size)
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Updates the recorded path after the file was moved, e.g. by a rename
    /// of its parent directory. The descriptor and lock follow the inode
    /// and are unaffected.
    pub fn relocate(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock and the descriptor.
    pub fn close(self) -> io::Result<()> {
        self.file.unlock()
    }
}

/// Flushes file data to stable storage, warning when the sync exceeds the
/// latency budget.
pub fn sync_with_warn(file: &File, path: &Path) -> io::Result<()> {
    let start = Instant::now();
    file.sync_data()?;
    let elapsed = start.elapsed();
    if elapsed > SLOW_SYNC_THRESHOLD {
        tracing::warn!(
            path = %path.display(),
            elapsed_ms = elapsed.as_millis() as u64,
            "slow fsync on binlog segment"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_preallocate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg");
        let f = LockedFile::create(&path).unwrap();
        f.preallocate(4096).unwrap();
        assert_eq!(f.file().metadata().unwrap().len(), 4096);

        // Preallocating a smaller size never shrinks the file.
        f.preallocate(1024).unwrap();
        assert_eq!(f.file().metadata().unwrap().len(), 4096);
        f.close().unwrap();
    }

    #[test]
    fn test_try_open_rw_contended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg");
        let held = LockedFile::create(&path).unwrap();

        let result = LockedFile::try_open_rw(&path);
        assert!(matches!(result, Err(BinlogError::LockHeld(_))));

        held.close().unwrap();
        LockedFile::try_open_rw(&path).unwrap();
    }

    #[test]
    fn test_create_preserves_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg");
        std::fs::write(&path, b"keep").unwrap();
        let f = LockedFile::create(&path).unwrap();
        assert_eq!(f.file().metadata().unwrap().len(), 4);
    }
}
