//! Record wire format.
//!
//! Each record is serialized with a fixed 25-byte header followed by the
//! payload, all integers little-endian:
//!
//! ```text
//! +---------+-----------------+-----------------+----------+------------+
//! | magic   | commit_ts       | start_ts        | size     | payload    |
//! | 1 byte  | 8 bytes         | 8 bytes         | 8 bytes  | size bytes |
//! +---------+-----------------+-----------------+----------+------------+
//! ```
//!
//! `size` is always `payload.len()`; it is redundant with the enclosing
//! frame's length field but independently encoded so a record is
//! self-describing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::BinlogError;
use crate::RECORD_HEADER_SIZE;

/// Magic byte opening every serialized record.
pub const RECORD_MAGIC: u8 = 0x01;

/// A position in the logical record stream: the segment sequence number and
/// the byte offset within that segment's record stream.
///
/// The offset returned alongside each decoded entry is the caller's resume
/// point: reopening the log at that offset continues with the next record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BinlogOffset {
    /// Sequence number of the segment file.
    pub index: u64,
    /// Byte position within the segment. A freshly opened segment starts
    /// at offset 0.
    pub offset: u64,
}

impl BinlogOffset {
    pub fn new(index: u64, offset: u64) -> Self {
        Self { index, offset }
    }
}

/// One logical log entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub commit_ts: i64,
    pub start_ts: i64,
    pub payload: Bytes,
}

impl Entry {
    pub fn new(commit_ts: i64, start_ts: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            commit_ts,
            start_ts,
            payload: payload.into(),
        }
    }

    /// Serialized length: header plus payload.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }

    /// Encodes the record into its wire representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(RECORD_MAGIC);
        buf.put_i64_le(self.commit_ts);
        buf.put_i64_le(self.start_ts);
        buf.put_i64_le(self.payload.len() as i64);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decodes a record from a complete serialized buffer.
    pub fn decode(buf: &[u8]) -> Result<Self, BinlogError> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(BinlogError::InvalidRecord {
                reason: format!("record too short: {} bytes", buf.len()),
            });
        }
        if buf[0] != RECORD_MAGIC {
            return Err(BinlogError::InvalidRecord {
                reason: format!("bad magic byte {:#04x}", buf[0]),
            });
        }

        let mut header = &buf[1..RECORD_HEADER_SIZE];
        let commit_ts = header.get_i64_le();
        let start_ts = header.get_i64_le();
        let size = header.get_i64_le();

        if size < 0 || size as usize + RECORD_HEADER_SIZE != buf.len() {
            return Err(BinlogError::InvalidRecord {
                reason: format!(
                    "size field {} does not match buffer length {}",
                    size,
                    buf.len()
                ),
            });
        }

        Ok(Self {
            commit_ts,
            start_ts,
            payload: Bytes::copy_from_slice(&buf[RECORD_HEADER_SIZE..]),
        })
    }
}
