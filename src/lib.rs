//! # binlog
//!
//! Segmented, append-only binary log store.
//!
//! A binlog persists an ordered stream of change records across fixed-capacity
//! segment files and lets consumers resume reading from an arbitrary byte
//! offset after a restart or crash. This crate provides:
//! - Length-prefixed, padding-aligned frame encoding of records
//! - Segment rotation with background file preallocation
//! - Atomic-rename directory bootstrap
//! - Locked-segment lifecycle management (acquire, release, close)

pub mod binlog;
pub mod codec;
pub mod error;
pub mod fileutil;
pub mod names;
pub mod pipeline;
pub mod record;

pub use binlog::{Binlog, BinlogConfig};
pub use codec::{Decoder, Encoder};
pub use error::BinlogError;
pub use record::{BinlogOffset, Entry};

/// Default segment capacity (64 MB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 64_000_000;

/// Serialized record header size in bytes (magic, two timestamps, payload size).
pub const RECORD_HEADER_SIZE: usize = 25;

/// Frame length-field size in bytes.
pub const LEN_FIELD_SIZE: usize = 8;
