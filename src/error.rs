//! Binlog error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during binlog operations.
#[derive(Debug, Error)]
pub enum BinlogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binlog directory {0:?} already contains files")]
    AlreadyExists(PathBuf),

    #[error("file: file not found")]
    FileNotFound,

    #[error("segment {0:?} is locked by another process")]
    LockHeld(PathBuf),

    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("torn frame in segment {index} at offset {offset}")]
    TornFrame { index: u64, offset: u64 },

    #[error("record too large: {size} bytes")]
    RecordTooLarge { size: usize },

    #[error("bad segment file name {0}")]
    BadSegmentName(String),

    #[error("file pipeline failed: {0}")]
    Pipeline(String),

    #[error("binlog is not open for writing")]
    NotWritable,

    #[error("binlog is not open for reading")]
    NotReadable,
}
