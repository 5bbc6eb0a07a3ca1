//! Segment file naming and directory listing.
//!
//! Segments are named by a decimal sequence number zero-padded to at least
//! 16 digits, with a `.bl` extension. Within the padded range lexicographic
//! order is also numeric order.

use std::path::Path;

use crate::error::BinlogError;

const SEGMENT_SUFFIX: &str = ".bl";
const TMP_SUFFIX: &str = ".tmp";

/// Builds the file name for a segment sequence number.
pub fn file_name(index: u64) -> String {
    format!("{index:016}{SEGMENT_SUFFIX}")
}

/// Parses a segment sequence number out of a file name.
///
/// The stem must be at least 16 ASCII digits; sequence numbers past the
/// padded width produce longer stems and still parse.
pub fn parse_binlog_name(name: &str) -> Result<u64, BinlogError> {
    let bad = || BinlogError::BadSegmentName(name.to_string());
    let stem = name.strip_suffix(SEGMENT_SUFFIX).ok_or_else(bad)?;
    if stem.len() < 16 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    stem.parse().map_err(|_| bad())
}

/// Parses the sequence number of a segment file path.
pub fn segment_index(path: &Path) -> Result<u64, BinlogError> {
    let name = path
        .file_name()
        .ok_or_else(|| BinlogError::BadSegmentName(path.display().to_string()))?;
    parse_binlog_name(&name.to_string_lossy())
}

/// Returns whether the directory exists and contains any entries.
pub fn exist(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// Lists the segment file names in a directory, sorted in sequence order.
///
/// In-flight `.tmp` preallocation artifacts are skipped silently; any other
/// unrecognized name is logged and ignored. Fails with `FileNotFound` when
/// the directory holds no valid segments.
pub fn read_binlog_names(dir: &Path) -> Result<Vec<String>, BinlogError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match parse_binlog_name(&name) {
            Ok(_) => names.push(name),
            Err(_) => {
                if !name.ends_with(TMP_SUFFIX) {
                    tracing::warn!(file = %name, "ignored file in binlog directory");
                }
            }
        }
    }

    if names.is_empty() {
        return Err(BinlogError::FileNotFound);
    }
    names.sort();
    Ok(names)
}

/// Finds the position of the segment covering `index`: the newest segment
/// whose sequence number is `<= index`. Assumes `names` is sorted.
pub fn search_index(names: &[String], index: u64) -> Option<usize> {
    for (i, name) in names.iter().enumerate().rev() {
        match parse_binlog_name(name) {
            Ok(cur) if cur <= index => return Some(i),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "parse of a checked name should never fail");
            }
        }
    }
    None
}
