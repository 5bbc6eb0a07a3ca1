//! Background segment preallocation.
//!
//! The pipeline keeps one locked, fully preallocated segment file ready so
//! that rotation on the write path never waits on filesystem allocation.
//! Prepared files live under a rotating temporary name (`0.tmp`/`1.tmp`, so
//! a crash abandons at most two) and are renamed into the segment sequence
//! by the engine when claimed. A temp file is only ever written after that
//! rename, so reusing an abandoned one is safe.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::error::BinlogError;
use crate::fileutil::LockedFile;

/// Hands preallocated segment files from a background thread to the engine
/// through a rendezvous channel.
pub struct FilePipeline {
    rx: Option<Receiver<Result<LockedFile, BinlogError>>>,
    handle: Option<JoinHandle<()>>,
    failed: Option<String>,
}

impl FilePipeline {
    /// Starts the background allocation loop rooted at `dir`.
    pub fn new(dir: &Path, segment_size: u64) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(0);
        let dir = dir.to_path_buf();
        let handle = thread::Builder::new()
            .name("binlog-prealloc".to_string())
            .spawn(move || run(dir, segment_size, tx))?;
        Ok(Self {
            rx: Some(rx),
            handle: Some(handle),
            failed: None,
        })
    }

    /// Claims the prepared file, blocking until one is ready. Once the
    /// background loop has failed, this and every later call return the
    /// error.
    pub fn open(&mut self) -> Result<LockedFile, BinlogError> {
        if let Some(msg) = &self.failed {
            return Err(BinlogError::Pipeline(msg.clone()));
        }
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| BinlogError::Pipeline("pipeline is closed".to_string()))?;

        match rx.recv() {
            Ok(Ok(file)) => Ok(file),
            Ok(Err(e)) => {
                self.failed = Some(e.to_string());
                Err(e)
            }
            Err(_) => {
                let msg = "preallocation thread exited".to_string();
                self.failed = Some(msg.clone());
                Err(BinlogError::Pipeline(msg))
            }
        }
    }

    /// Stops the background loop and blocks until it has exited, removing
    /// any unclaimed temp file.
    pub fn close(&mut self) {
        // Dropping the receiver unblocks a pending handoff.
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FilePipeline {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(dir: PathBuf, segment_size: u64, tx: SyncSender<Result<LockedFile, BinlogError>>) {
    let mut count = 0u64;
    loop {
        match alloc(&dir, segment_size, count) {
            Ok(file) => {
                count += 1;
                if let Err(mpsc::SendError(unclaimed)) = tx.send(Ok(file)) {
                    // Stop requested; reclaim the unclaimed file.
                    if let Ok(file) = unclaimed {
                        let path = file.path().to_path_buf();
                        if let Err(e) = fs::remove_file(&path) {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "failed to remove unclaimed temp segment"
                            );
                        }
                        if let Err(e) = file.close() {
                            tracing::warn!(error = %e, "failed to unlock unclaimed temp segment");
                        }
                    }
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to preallocate segment file");
                // Errors are fatal to the pipeline; park the error for the
                // engine to observe.
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

fn alloc(dir: &Path, segment_size: u64, count: u64) -> Result<LockedFile, BinlogError> {
    let path = dir.join(format!("{}.tmp", count % 2));
    let file = LockedFile::create(&path)?;
    file.preallocate(segment_size)?;
    Ok(file)
}
