//! Frame encoding and decoding.
//!
//! Every record is wrapped in a frame: an 8-byte little-endian length field
//! followed by the serialized record and up to 7 zero bytes of padding that
//! round the frame payload to a multiple of 8. The low 56 bits of the length
//! field hold the record length; when padding is present the top byte is
//! `0x80 | pad_bytes`. A length field of exactly zero marks the end of a
//! segment's frame stream and tells the decoder to advance to the next
//! chained segment.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

use crate::error::BinlogError;
use crate::record::{BinlogOffset, Entry};
use crate::LEN_FIELD_SIZE;

/// Write buffer capacity for the encoder (1 MB).
const ENCODER_BUF_SIZE: usize = 1 << 20;

/// Largest record length representable in the 56-bit length field.
const MAX_RECORD_BYTES: usize = (1 << 56) - 1;

/// Splits a record length into the frame length field and pad count.
pub fn encode_frame_size(data_bytes: usize) -> Result<(u64, usize), BinlogError> {
    if data_bytes == 0 {
        // A zero length field is the segment-exhausted sentinel; it must
        // never be produced by an encode.
        return Err(BinlogError::InvalidRecord {
            reason: "zero-length record".to_string(),
        });
    }
    if data_bytes > MAX_RECORD_BYTES {
        return Err(BinlogError::RecordTooLarge { size: data_bytes });
    }

    let pad_bytes = (8 - data_bytes % 8) % 8;
    let mut len_field = data_bytes as u64;
    if pad_bytes != 0 {
        len_field |= (0x80 | pad_bytes as u64) << 56;
    }
    Ok((len_field, pad_bytes))
}

/// Splits a frame length field into record bytes and pad bytes.
pub fn decode_frame_size(len_field: u64) -> (u64, u64) {
    let rec_bytes = len_field & !(0xffu64 << 56);
    let pad_bytes = if len_field & (1 << 63) != 0 {
        (len_field >> 56) & 0x7
    } else {
        0
    };
    (rec_bytes, pad_bytes)
}

/// Buffered frame writer over the tail segment.
///
/// Tracks the absolute byte position of the underlying file so the engine
/// can check the segment capacity without a seek syscall.
pub struct Encoder {
    w: BufWriter<File>,
    offset: u64,
}

impl Encoder {
    /// Wraps a file whose cursor currently sits at `offset`.
    pub(crate) fn new(file: File, offset: u64) -> Self {
        Self {
            w: BufWriter::with_capacity(ENCODER_BUF_SIZE, file),
            offset,
        }
    }

    /// Encodes one entry as a frame onto the segment.
    pub fn encode(&mut self, ent: &Entry) -> Result<(), BinlogError> {
        let data = ent.encode();
        let (len_field, pad_bytes) = encode_frame_size(data.len())?;

        self.w.write_all(&len_field.to_le_bytes())?;
        self.w.write_all(&data)?;
        if pad_bytes != 0 {
            const ZEROS: [u8; 8] = [0u8; 8];
            self.w.write_all(&ZEROS[..pad_bytes])?;
        }

        self.offset += (LEN_FIELD_SIZE + data.len() + pad_bytes) as u64;
        Ok(())
    }

    /// Flushes buffered frames to the file.
    pub fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }

    /// Current write position within the segment.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// One open segment in a decoder chain.
pub(crate) struct SegmentReader {
    index: u64,
    reader: BufReader<File>,
}

impl SegmentReader {
    pub(crate) fn new(index: u64, file: File) -> Self {
        Self {
            index,
            reader: BufReader::new(file),
        }
    }
}

/// Frame reader over a chain of segment files opened in sequence order.
///
/// Exhausting one segment (end of stream or a zero length field left by
/// preallocation) transparently advances to the next, resetting the tracked
/// offset to the start of that segment.
pub struct Decoder {
    readers: VecDeque<SegmentReader>,
    offset: BinlogOffset,
    deferred: Option<BinlogError>,
}

impl Decoder {
    pub(crate) fn new(offset: BinlogOffset, readers: VecDeque<SegmentReader>) -> Self {
        Self {
            readers,
            offset,
            deferred: None,
        }
    }

    /// Parks an error to be returned by the next `decode` call. Lets a
    /// batched caller hand out already-decoded entries before surfacing a
    /// mid-batch failure.
    pub(crate) fn defer_err(&mut self, e: BinlogError) {
        self.deferred = Some(e);
    }

    /// The resume position after the most recently decoded entry.
    pub fn offset(&self) -> BinlogOffset {
        self.offset
    }

    /// Decodes the next entry, or returns `None` once every chained segment
    /// is exhausted.
    pub fn decode(&mut self) -> Result<Option<Entry>, BinlogError> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        loop {
            let front = match self.readers.front_mut() {
                Some(front) => front,
                None => return Ok(None),
            };

            let len_field = match read_len_field(&mut front.reader) {
                Ok(Some(n)) => n,
                Ok(None) => 0,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(BinlogError::TornFrame {
                        index: front.index,
                        offset: self.offset.offset,
                    })
                }
                Err(e) => return Err(e.into()),
            };

            if len_field == 0 {
                // Segment exhausted; resume on the next chained segment.
                self.readers.pop_front();
                if let Some(next) = self.readers.front() {
                    self.offset = BinlogOffset::new(next.index, 0);
                } else {
                    return Ok(None);
                }
                continue;
            }

            let (rec_bytes, pad_bytes) = decode_frame_size(len_field);
            let mut data = vec![0u8; (rec_bytes + pad_bytes) as usize];
            front.reader.read_exact(&mut data).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    BinlogError::TornFrame {
                        index: front.index,
                        offset: self.offset.offset,
                    }
                } else {
                    BinlogError::Io(e)
                }
            })?;

            let ent = Entry::decode(&data[..rec_bytes as usize])?;
            self.offset.offset += rec_bytes + pad_bytes + LEN_FIELD_SIZE as u64;
            return Ok(Some(ent));
        }
    }
}

/// Reads one 8-byte length field. `Ok(None)` means a clean end of stream at
/// a frame boundary; a partial read is surfaced as `UnexpectedEof`.
fn read_len_field<R: Read>(r: &mut R) -> io::Result<Option<u64>> {
    let mut buf = [0u8; LEN_FIELD_SIZE];
    let mut filled = 0;
    while filled < LEN_FIELD_SIZE {
        let n = match r.read(&mut buf[filled..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "torn length field",
            ));
        }
        filled += n;
    }
    Ok(Some(u64::from_le_bytes(buf)))
}
