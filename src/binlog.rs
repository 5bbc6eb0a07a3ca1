//! Log engine: directory bootstrap, open-for-read/write, append, rotation,
//! offset-addressed resumption, and locked-segment retention.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::codec::{encode_frame_size, Decoder, Encoder, SegmentReader};
use crate::error::BinlogError;
use crate::fileutil::{sync_with_warn, LockedFile};
use crate::names::{exist, file_name, parse_binlog_name, read_binlog_names, search_index, segment_index};
use crate::pipeline::FilePipeline;
use crate::record::{BinlogOffset, Entry};
use crate::DEFAULT_SEGMENT_SIZE;

/// Binlog configuration.
#[derive(Debug, Clone)]
pub struct BinlogConfig {
    /// Directory holding the segment files.
    pub dir: PathBuf,
    /// Maximum segment size before rotation.
    pub segment_size: u64,
}

impl BinlogConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }

    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }
}

/// Mutable handle state; one lock serializes every append and read.
struct Inner {
    encoder: Option<Encoder>,
    decoder: Option<Decoder>,
    /// Held segment locks, ordered oldest to newest; the last one is the
    /// write tail.
    locks: Vec<LockedFile>,
    pipeline: Option<FilePipeline>,
}

/// A handle onto a segmented binlog directory.
pub struct Binlog {
    dir: PathBuf,
    segment_size: u64,
    inner: Mutex<Inner>,
}

impl Binlog {
    /// Initializes a fresh binlog directory and opens it for writing.
    ///
    /// The directory is built under a sibling `<dir>.tmp` path and then
    /// atomically renamed in, so an observer never sees a half-populated
    /// directory. Fails with `AlreadyExists` when `dir` already contains
    /// files.
    pub fn create(config: BinlogConfig) -> Result<Self, BinlogError> {
        if exist(&config.dir) {
            return Err(BinlogError::AlreadyExists(config.dir.clone()));
        }

        let tmpdir = sibling_tmp_dir(&config.dir);
        if tmpdir.exists() {
            fs::remove_dir_all(&tmpdir)?;
        }
        fs::create_dir_all(&tmpdir)?;

        let mut segment = LockedFile::create(&tmpdir.join(file_name(0)))?;
        segment.preallocate(config.segment_size)?;
        let write_file = segment.file().try_clone()?;

        if config.dir.exists() {
            fs::remove_dir_all(&config.dir)?;
        }
        fs::rename(&tmpdir, &config.dir)?;
        // The staging directory is gone; track the segment under its final
        // path.
        segment.relocate(config.dir.join(file_name(0)));
        tracing::info!(dir = %config.dir.display(), "binlog directory created");

        let pipeline = FilePipeline::new(&config.dir, config.segment_size)?;
        Ok(Self {
            dir: config.dir,
            segment_size: config.segment_size,
            inner: Mutex::new(Inner {
                encoder: Some(Encoder::new(write_file, 0)),
                decoder: None,
                locks: vec![segment],
                pipeline: Some(pipeline),
            }),
        })
    }

    /// Opens an existing binlog for appending.
    ///
    /// Locks the newest segment without blocking, repairs a torn final
    /// frame if the previous writer crashed mid-append, and positions the
    /// encoder at the end of valid data.
    pub fn open_for_write(config: BinlogConfig) -> Result<Self, BinlogError> {
        let names = read_binlog_names(&config.dir)?;
        let last = names.last().ok_or(BinlogError::FileNotFound)?;

        let tail = LockedFile::try_open_rw(&config.dir.join(last))?;
        let tail_index = parse_binlog_name(last)?;
        let valid_end = repair_tail(&tail, tail_index, config.segment_size)?;

        let mut write_file = tail.file().try_clone()?;
        write_file.seek(SeekFrom::Start(valid_end))?;

        let pipeline = FilePipeline::new(&config.dir, config.segment_size)?;
        Ok(Self {
            dir: config.dir,
            segment_size: config.segment_size,
            inner: Mutex::new(Inner {
                encoder: Some(Encoder::new(write_file, valid_end)),
                decoder: None,
                locks: vec![tail],
                pipeline: Some(pipeline),
            }),
        })
    }

    /// Opens an existing binlog for reading from `offset`.
    pub fn open_for_read(config: BinlogConfig, offset: BinlogOffset) -> Result<Self, BinlogError> {
        Self::open(config, offset, false)
    }

    /// Opens an existing binlog for reading from `offset`, optionally
    /// keeping every opened segment locked for writing.
    ///
    /// With `write = true` the handle can replay history and then keep
    /// appending: segments are locked read-write and a preallocation
    /// pipeline is stood up behind the tail.
    pub fn open(
        config: BinlogConfig,
        offset: BinlogOffset,
        write: bool,
    ) -> Result<Self, BinlogError> {
        let names = read_binlog_names(&config.dir)?;
        let name_index = search_index(&names, offset.index).ok_or(BinlogError::FileNotFound)?;
        let names = &names[name_index..];

        let mut locks = Vec::new();
        let mut encoder = None;
        let mut pipeline = None;
        if write {
            for name in names {
                locks.push(LockedFile::try_open_rw(&config.dir.join(name))?);
            }
            let tail = locks.last().ok_or(BinlogError::FileNotFound)?;
            let tail_index = segment_index(tail.path())?;
            let valid_end = repair_tail(tail, tail_index, config.segment_size)?;

            let mut write_file = tail.file().try_clone()?;
            write_file.seek(SeekFrom::Start(valid_end))?;
            encoder = Some(Encoder::new(write_file, valid_end));
            pipeline = Some(FilePipeline::new(&config.dir, config.segment_size)?);
        }

        let mut opened = Vec::new();
        let mut seeked = false;
        for (i, name) in names.iter().enumerate() {
            let index = parse_binlog_name(name)?;
            let mut file = File::open(config.dir.join(name))?;
            if i == 0 && index == offset.index {
                let pos = file.seek(SeekFrom::Start(offset.offset))?;
                if pos >= file.metadata()?.len() {
                    // The offset points exactly at this segment's rotation
                    // boundary; nothing is left to read here.
                    continue;
                }
                seeked = true;
            }
            opened.push((index, file));
        }

        let start = if seeked {
            offset
        } else if let Some(&(index, _)) = opened.first() {
            BinlogOffset::new(index, 0)
        } else {
            offset
        };
        let readers: VecDeque<SegmentReader> = opened
            .into_iter()
            .map(|(index, file)| SegmentReader::new(index, file))
            .collect();

        Ok(Self {
            dir: config.dir,
            segment_size: config.segment_size,
            inner: Mutex::new(Inner {
                encoder,
                decoder: Some(Decoder::new(start, readers)),
                locks,
                pipeline,
            }),
        })
    }

    /// Returns whether `dir` exists and holds any files.
    pub fn exist(dir: &Path) -> bool {
        exist(dir)
    }

    /// Appends a batch of entries in order.
    ///
    /// The batch is validated up front so an encode failure aborts the
    /// whole batch before any frame is written. The tail is synced after
    /// the batch, or rotated when it has reached the segment capacity.
    pub fn write(&self, ents: &[Entry]) -> Result<(), BinlogError> {
        if ents.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let encoder = inner.encoder.as_mut().ok_or(BinlogError::NotWritable)?;

        for ent in ents {
            encode_frame_size(ent.encoded_len())?;
        }
        for ent in ents {
            encoder.encode(ent)?;
        }

        if encoder.offset() < self.segment_size {
            Self::sync_inner(&mut inner)
        } else {
            self.cut(&mut inner)
        }
    }

    /// Reads up to `count` entries, each paired with the resume offset
    /// after it. The batch is short when the stream ends first.
    ///
    /// An error hit mid-batch never discards entries already decoded: the
    /// short batch is returned and the error resurfaces on the next call.
    pub fn read(&self, count: usize) -> Result<Vec<(Entry, BinlogOffset)>, BinlogError> {
        let mut inner = self.inner.lock();
        let decoder = inner.decoder.as_mut().ok_or(BinlogError::NotReadable)?;

        let mut ents = Vec::new();
        while ents.len() < count {
            match decoder.decode() {
                Ok(Some(ent)) => ents.push((ent, decoder.offset())),
                Ok(None) => break,
                Err(e) => {
                    if ents.is_empty() {
                        return Err(e);
                    }
                    decoder.defer_err(e);
                    break;
                }
            }
        }
        Ok(ents)
    }

    /// Flushes and syncs the tail segment.
    pub fn sync(&self) -> Result<(), BinlogError> {
        Self::sync_inner(&mut self.inner.lock())
    }

    /// Releases every held lock older than the first one whose sequence
    /// number is `>= index`. The tail lock is never released.
    ///
    /// Lets a long-lived handle drop descriptors for segments a downstream
    /// consumer has fully acknowledged; released segments can still be
    /// reopened for reading.
    pub fn release_lock_to(&self, index: u64) -> Result<(), BinlogError> {
        let mut inner = self.inner.lock();
        if inner.locks.is_empty() {
            return Ok(());
        }

        let mut boundary = None;
        for (i, lock) in inner.locks.iter().enumerate() {
            if segment_index(lock.path())? >= index {
                boundary = Some(i);
                break;
            }
        }
        let boundary = boundary.unwrap_or(inner.locks.len() - 1);

        for lock in inner.locks.drain(..boundary) {
            let path = lock.path().to_path_buf();
            if let Err(e) = lock.close() {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "failed to unlock released segment"
                );
            }
        }
        Ok(())
    }

    /// The segment sequence numbers currently held under lock, oldest
    /// first.
    pub fn held_segments(&self) -> Vec<u64> {
        self.inner
            .lock()
            .locks
            .iter()
            .filter_map(|l| segment_index(l.path()).ok())
            .collect()
    }

    /// Stops the preallocation pipeline, syncs the tail, and releases every
    /// held lock. Unlock failures are logged; the first fatal sync error is
    /// returned.
    pub fn close(&self) -> Result<(), BinlogError> {
        let mut inner = self.inner.lock();

        if let Some(mut pipeline) = inner.pipeline.take() {
            pipeline.close();
        }

        let mut first_err = None;
        if inner.encoder.is_some() {
            if let Err(e) = Self::sync_inner(&mut inner) {
                first_err = Some(e);
            }
        }
        inner.encoder = None;
        inner.decoder = None;

        for lock in inner.locks.drain(..) {
            let path = lock.path().to_path_buf();
            if let Err(e) = lock.close() {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "failed to unlock during binlog close"
                );
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn sync_inner(inner: &mut Inner) -> Result<(), BinlogError> {
        if let Some(encoder) = inner.encoder.as_mut() {
            encoder.flush()?;
        }
        if let Some(tail) = inner.locks.last() {
            sync_with_warn(tail.file(), tail.path())?;
        }
        Ok(())
    }

    /// Rotates to a freshly preallocated segment.
    ///
    /// The outgoing tail is truncated to its true content length and synced
    /// before the prepared file is claimed, renamed into the sequence, and
    /// re-locked under its final name.
    fn cut(&self, inner: &mut Inner) -> Result<(), BinlogError> {
        let encoder = inner.encoder.as_mut().ok_or(BinlogError::NotWritable)?;
        let offset = encoder.offset();
        encoder.flush()?;

        let tail = inner.locks.last().ok_or(BinlogError::NotWritable)?;
        tail.file().set_len(offset)?;
        sync_with_warn(tail.file(), tail.path())?;
        let next_index = segment_index(tail.path())? + 1;

        let pipeline = inner.pipeline.as_mut().ok_or(BinlogError::NotWritable)?;
        let prepared = pipeline.open()?;
        let segment_path = self.dir.join(file_name(next_index));
        fs::rename(prepared.path(), &segment_path)?;

        // Close the temp-named lock and re-acquire under the final name so
        // a single lock identity covers the inode.
        if let Err(e) = prepared.close() {
            tracing::warn!(error = %e, "failed to unlock claimed temp segment");
        }
        let new_tail = LockedFile::open_rw(&segment_path)?;
        let write_file = new_tail.file().try_clone()?;
        inner.locks.push(new_tail);
        inner.encoder = Some(Encoder::new(write_file, 0));

        tracing::info!(segment = %segment_path.display(), "segmented binlog file created");
        Ok(())
    }
}

/// `<dir>.tmp`, the sibling staging path used by the bootstrap rename.
fn sibling_tmp_dir(dir: &Path) -> PathBuf {
    let mut os = dir.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Scans the tail segment for the end of its last complete frame, truncates
/// anything after it (a torn frame and the preallocated zero suffix), and
/// preallocates the segment back to capacity. Returns the append position.
fn repair_tail(
    tail: &LockedFile,
    index: u64,
    segment_size: u64,
) -> Result<u64, BinlogError> {
    let scan = File::open(tail.path())?;
    let mut readers = VecDeque::new();
    readers.push_back(SegmentReader::new(index, scan));
    let mut decoder = Decoder::new(BinlogOffset::new(index, 0), readers);

    loop {
        match decoder.decode() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(BinlogError::TornFrame { offset, .. }) => {
                tracing::warn!(
                    segment = %tail.path().display(),
                    offset,
                    "truncating torn frame at tail of segment"
                );
                break;
            }
            Err(BinlogError::InvalidRecord { reason }) => {
                tracing::warn!(
                    segment = %tail.path().display(),
                    reason,
                    "truncating unreadable data at tail of segment"
                );
                break;
            }
            Err(e) => return Err(e),
        }
    }

    let valid_end = decoder.offset().offset;
    if tail.file().metadata()?.len() > valid_end {
        tail.file().set_len(valid_end)?;
    }
    tail.preallocate(segment_size)?;
    Ok(valid_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> BinlogConfig {
        // Small segments so rotation is cheap to trigger.
        BinlogConfig::new(dir).with_segment_size(1024)
    }

    fn log_dir(tmp: &TempDir) -> PathBuf {
        tmp.path().join("binlog")
    }

    /// Entry whose frame occupies exactly 48 bytes on disk.
    fn entry48(i: u8) -> Entry {
        Entry::new(i as i64, i as i64, vec![i; 8])
    }

    #[test]
    fn test_create_write_read() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);

        let b = Binlog::create(test_config(&dir)).unwrap();
        b.write(&[Entry::new(1, 1, &b"a"[..]), Entry::new(2, 2, &b"bb"[..])])
            .unwrap();
        b.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        let ents = r.read(2).unwrap();
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].0.payload, &b"a"[..]);
        assert_eq!(ents[1].0.payload, &b"bb"[..]);
        // Each frame is 8 (length field) + 25 (header) + payload + pad.
        assert_eq!(ents[0].1, BinlogOffset::new(0, 40));
        assert_eq!(ents[1].1, BinlogOffset::new(0, 80));
        r.close().unwrap();
    }

    #[test]
    fn test_create_on_existing_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        b.close().unwrap();

        assert!(matches!(
            Binlog::create(test_config(&dir)),
            Err(BinlogError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_idempotent_open() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        for i in 0..5 {
            b.write(&[entry48(i)]).unwrap();
        }
        b.close().unwrap();

        let read_all = || {
            let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
            let ents = r.read(100).unwrap();
            r.close().unwrap();
            ents
        };
        let first = read_all();
        let second = read_all();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_segment_rotation() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let config = BinlogConfig::new(&dir).with_segment_size(128);

        let b = Binlog::create(config.clone()).unwrap();
        for i in 0..4 {
            b.write(&[entry48(i)]).unwrap();
        }
        assert_eq!(b.held_segments(), vec![0, 1]);
        b.close().unwrap();

        let names = read_binlog_names(&dir).unwrap();
        assert_eq!(names, vec![file_name(0), file_name(1)]);

        // The rotated segment was truncated to its true content length.
        let seg0_len = fs::metadata(dir.join(file_name(0))).unwrap().len();
        assert_eq!(seg0_len, 3 * 48);

        let r = Binlog::open_for_read(config, BinlogOffset::default()).unwrap();
        let ents = r.read(100).unwrap();
        assert_eq!(ents.len(), 4);
        for (i, (ent, _)) in ents.iter().enumerate() {
            assert_eq!(ent.payload, vec![i as u8; 8]);
        }
        // The fourth entry lives at the start of segment 1.
        assert_eq!(ents[3].1, BinlogOffset::new(1, 48));
        r.close().unwrap();
    }

    #[test]
    fn test_resume_from_offset() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        for i in 0..5 {
            b.write(&[entry48(i)]).unwrap();
        }
        b.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        let head = r.read(3).unwrap();
        let resume = head.last().unwrap().1;
        r.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), resume).unwrap();
        let rest = r.read(100).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].0.payload, vec![3u8; 8]);
        assert_eq!(rest[1].0.payload, vec![4u8; 8]);
        r.close().unwrap();
    }

    #[test]
    fn test_resume_at_rotation_boundary() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let config = BinlogConfig::new(&dir).with_segment_size(128);
        let b = Binlog::create(config.clone()).unwrap();
        for i in 0..4 {
            b.write(&[entry48(i)]).unwrap();
        }
        b.close().unwrap();

        // Offset pointing exactly at the end of segment 0 skips it.
        let r = Binlog::open_for_read(config, BinlogOffset::new(0, 3 * 48)).unwrap();
        let ents = r.read(100).unwrap();
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].0.payload, vec![3u8; 8]);
        assert_eq!(ents[0].1, BinlogOffset::new(1, 48));
        r.close().unwrap();
    }

    #[test]
    fn test_reopen_for_write_continues() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        b.write(&[Entry::new(1, 1, &b"a"[..]), Entry::new(2, 2, &b"bb"[..])])
            .unwrap();
        b.close().unwrap();

        let b = Binlog::open_for_write(test_config(&dir)).unwrap();
        b.write(&[Entry::new(3, 3, &b"ccc"[..])]).unwrap();
        b.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        let ents = r.read(100).unwrap();
        assert_eq!(ents.len(), 3);
        assert_eq!(ents[2].0.payload, &b"ccc"[..]);
        assert_eq!(ents[2].1, BinlogOffset::new(0, 120));
        r.close().unwrap();
    }

    #[test]
    fn test_reopen_for_write_repairs_torn_tail() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        b.write(&[Entry::new(1, 1, &b"a"[..]), Entry::new(2, 2, &b"bb"[..])])
            .unwrap();
        b.close().unwrap();

        // Tear the second frame: content ends at 80, cut 3 bytes into it.
        let seg0 = dir.join(file_name(0));
        let file = fs::OpenOptions::new().write(true).open(&seg0).unwrap();
        file.set_len(77).unwrap();
        drop(file);

        let b = Binlog::open_for_write(test_config(&dir)).unwrap();
        b.write(&[Entry::new(3, 3, &b"replacement"[..])]).unwrap();
        b.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        let ents = r.read(100).unwrap();
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].0.payload, &b"a"[..]);
        assert_eq!(ents[1].0.payload, &b"replacement"[..]);
        r.close().unwrap();
    }

    #[test]
    fn test_torn_tail_read() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        b.write(&[Entry::new(1, 1, &b"a"[..]), Entry::new(2, 2, &b"bb"[..])])
            .unwrap();
        b.close().unwrap();

        let seg0 = dir.join(file_name(0));
        let file = fs::OpenOptions::new().write(true).open(&seg0).unwrap();
        file.set_len(77).unwrap();
        drop(file);

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        // The record before the torn frame comes through; the error waits
        // for the next call.
        let batch = r.read(100).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0.payload, &b"a"[..]);
        assert!(matches!(r.read(1), Err(BinlogError::TornFrame { .. })));
        r.close().unwrap();
    }

    #[test]
    fn test_open_for_write_lock_held() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let writer = Binlog::create(test_config(&dir)).unwrap();

        assert!(matches!(
            Binlog::open_for_write(test_config(&dir)),
            Err(BinlogError::LockHeld(_))
        ));
        writer.close().unwrap();

        Binlog::open_for_write(test_config(&dir))
            .unwrap()
            .close()
            .unwrap();
    }

    #[test]
    fn test_open_before_oldest_segment() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let config = BinlogConfig::new(&dir).with_segment_size(128);
        let b = Binlog::create(config.clone()).unwrap();
        for i in 0..4 {
            b.write(&[entry48(i)]).unwrap();
        }
        b.close().unwrap();

        // Garbage-collect segment 0; index 0 is no longer covered.
        fs::remove_file(dir.join(file_name(0))).unwrap();
        assert!(matches!(
            Binlog::open_for_read(config.clone(), BinlogOffset::default()),
            Err(BinlogError::FileNotFound)
        ));

        // Index 1 still resolves.
        let r = Binlog::open_for_read(config, BinlogOffset::new(1, 0)).unwrap();
        assert_eq!(r.read(100).unwrap().len(), 1);
        r.close().unwrap();
    }

    #[test]
    fn test_open_for_read_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        assert!(Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).is_err());
    }

    #[test]
    fn test_release_lock_to() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let config = BinlogConfig::new(&dir).with_segment_size(128);
        let b = Binlog::create(config.clone()).unwrap();
        for i in 0..7 {
            b.write(&[entry48(i)]).unwrap();
        }
        assert_eq!(b.held_segments(), vec![0, 1, 2]);

        b.release_lock_to(1).unwrap();
        assert_eq!(b.held_segments(), vec![1, 2]);

        // Below every held index: no-op.
        b.release_lock_to(0).unwrap();
        assert_eq!(b.held_segments(), vec![1, 2]);

        // Above every held index: everything but the tail goes.
        b.release_lock_to(100).unwrap();
        assert_eq!(b.held_segments(), vec![2]);

        // Released segments can still be reopened for reading.
        let r = Binlog::open_for_read(config, BinlogOffset::default()).unwrap();
        assert_eq!(r.read(100).unwrap().len(), 7);
        r.close().unwrap();
        b.close().unwrap();
    }

    #[test]
    fn test_open_for_replay_then_write() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        b.write(&[Entry::new(1, 1, &b"a"[..]), Entry::new(2, 2, &b"bb"[..])])
            .unwrap();
        b.close().unwrap();

        let b = Binlog::open(test_config(&dir), BinlogOffset::default(), true).unwrap();
        let replayed = b.read(100).unwrap();
        assert_eq!(replayed.len(), 2);

        b.write(&[Entry::new(3, 3, &b"ccc"[..])]).unwrap();
        b.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        assert_eq!(r.read(100).unwrap().len(), 3);
        r.close().unwrap();
    }

    #[test]
    fn test_wrong_mode_errors() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let w = Binlog::create(test_config(&dir)).unwrap();
        assert!(matches!(w.read(1), Err(BinlogError::NotReadable)));
        // An empty batch is accepted on any handle.
        w.write(&[]).unwrap();
        w.close().unwrap();

        let r = Binlog::open_for_read(test_config(&dir), BinlogOffset::default()).unwrap();
        assert!(matches!(
            r.write(&[Entry::new(1, 1, &b"x"[..])]),
            Err(BinlogError::NotWritable)
        ));
        r.close().unwrap();
    }

    #[test]
    fn test_create_tracks_final_segment_path() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();

        // After the bootstrap rename the lock must point into the real
        // directory, not the staging path.
        let path = b.inner.lock().locks[0].path().to_path_buf();
        assert_eq!(path, dir.join(file_name(0)));
        b.close().unwrap();
    }

    #[test]
    fn test_bootstrap_leaves_no_tmp_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = log_dir(&tmp);
        let b = Binlog::create(test_config(&dir)).unwrap();
        b.close().unwrap();

        assert!(dir.is_dir());
        assert!(!sibling_tmp_dir(&dir).exists());
        assert!(Binlog::exist(&dir));
    }
}
