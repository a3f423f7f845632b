//! Hint sidecar: `<id>.hint` mirrors a sealed segment's live records as
//! `(timestamp, key_size, value_size, value_pos, key)` rows, with no
//! value payload and no per-row checksum, so recovery can rebuild the
//! key directory without scanning (and CRC-checking) every value. The
//! segment was already fsync'd and CRC-validated before the hint was
//! emitted, so a second checksum here would be redundant.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::HintError;
use crate::io::{read_exact_at, write_exact_at};
use crate::segment::SegmentId;

const HINT_EXTENSION: &str = "hint";
const MERGE_HINT_EXTENSION: &str = "hint.merge";
/// 8 (timestamp) + 4 (key_size) + 4 (value_size) + 4 (value_pos).
const ROW_HEADER_SIZE: usize = 20;

/// One row of a hint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintRow {
    pub timestamp: u64,
    pub key_size: u32,
    pub value_size: u32,
    pub value_pos: u32,
    pub key: Vec<u8>,
}

pub fn hint_path(dir: &Path, id: SegmentId) -> PathBuf {
    dir.join(format!("{:010}.{HINT_EXTENSION}", id.0))
}

pub fn merge_hint_path(dir: &Path, id: SegmentId) -> PathBuf {
    dir.join(format!("{:010}.{MERGE_HINT_EXTENSION}", id.0))
}

pub fn remove_hint(dir: &Path, id: SegmentId) -> std::io::Result<()> {
    match std::fs::remove_file(hint_path(dir, id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn remove_merge_hint(dir: &Path, id: SegmentId) -> std::io::Result<()> {
    match std::fs::remove_file(merge_hint_path(dir, id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// An open hint file, positioned for sequential appends.
pub struct HintFile {
    file: File,
    write_offset: u64,
}

impl HintFile {
    fn open_at(path: &Path) -> Result<HintFile, HintError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let write_offset = file.metadata()?.len();
        Ok(HintFile { file, write_offset })
    }

    pub fn open(dir: &Path, id: SegmentId) -> Result<HintFile, HintError> {
        HintFile::open_at(&hint_path(dir, id))
    }

    pub fn open_merge(dir: &Path, id: SegmentId) -> Result<HintFile, HintError> {
        HintFile::open_at(&merge_hint_path(dir, id))
    }

    /// Appends one row: `ts(8) | key_size(4) | value_size(4) |
    /// value_pos(4) | key`, little-endian.
    pub fn append(
        &mut self,
        timestamp: u64,
        value_size: u32,
        value_pos: u32,
        key: &[u8],
    ) -> std::io::Result<()> {
        let mut row = Vec::with_capacity(ROW_HEADER_SIZE + key.len());
        row.extend_from_slice(&timestamp.to_le_bytes());
        row.extend_from_slice(&(key.len() as u32).to_le_bytes());
        row.extend_from_slice(&value_size.to_le_bytes());
        row.extend_from_slice(&value_pos.to_le_bytes());
        row.extend_from_slice(key);

        write_exact_at(&self.file, &row, self.write_offset)?;
        self.write_offset += row.len() as u64;
        Ok(())
    }

    pub fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Reads every row in the file, in append order.
    pub fn read_rows(&self) -> std::io::Result<Vec<HintRow>> {
        let len = self.file.metadata()?.len();
        let mut rows = Vec::new();
        let mut pos = 0u64;
        while pos < len {
            let mut head = [0u8; ROW_HEADER_SIZE];
            read_exact_at(&self.file, &mut head, pos)?;
            let timestamp = u64::from_le_bytes(head[0..8].try_into().unwrap());
            let key_size = u32::from_le_bytes(head[8..12].try_into().unwrap());
            let value_size = u32::from_le_bytes(head[12..16].try_into().unwrap());
            let value_pos = u32::from_le_bytes(head[16..20].try_into().unwrap());

            let mut key = vec![0u8; key_size as usize];
            read_exact_at(&self.file, &mut key, pos + ROW_HEADER_SIZE as u64)?;

            pos += ROW_HEADER_SIZE as u64 + key_size as u64;
            rows.push(HintRow {
                timestamp,
                key_size,
                value_size,
                value_pos,
                key,
            });
        }
        Ok(rows)
    }
}
