//! Append-only data segment: `<id>.data` files holding the record log.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::crc;
use crate::error::SegmentError;
use crate::io::{read_exact_at, write_gathered};
use crate::keydir::KeydirValue;
use crate::record::Header;

/// Segment soft cap: 256 MiB.
pub const MAX_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

const EXTENSION: &str = "data";
/// Chunk size used by `copy_range` when streaming bytes during merge.
const COPY_CHUNK: usize = 4096;

/// A segment's numeric identifier. Strictly monotone over the directory's
/// lifetime; ids never reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u32);

impl SegmentId {
    /// `<dir>/<id>.data`, zero-padded to 10 digits (covers `u32::MAX`)
    /// so directory listings sort lexicographically in id order.
    pub fn data_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{:010}.{EXTENSION}", self.0))
    }

    /// Parses a segment id from a `<id>.data` file name's stem. Accepts
    /// any digit width up to 10 digits with value `<= u32::MAX`.
    pub fn parse(path: &Path) -> Result<SegmentId, SegmentError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SegmentError::InvalidPath(path.to_path_buf()))?;
        if stem.len() > 10 || stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SegmentError::InvalidPath(path.to_path_buf()));
        }
        u32::from_str(stem)
            .map(SegmentId)
            .map_err(|_| SegmentError::InvalidPath(path.to_path_buf()))
    }

    pub fn has_data_extension(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
    }

    /// `<dir>/<id>.data.merge`, the transient file merge writes into
    /// before the atomic rename that publishes a compacted segment.
    pub fn merge_data_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{:010}.{EXTENSION}.merge", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    ReadWrite,
}

/// An open data segment, either the single active (read-write) segment
/// or one of the sealed inactive (read-only) segments.
pub struct Segment {
    pub id: SegmentId,
    file: File,
    write_offset: u64,
    mode: Mode,
}

impl Segment {
    /// Opens `<id>.data`, creating it when `mode` is `ReadWrite` and it
    /// does not exist. `write_offset` is derived from the current file
    /// size. Rejects files already larger than `MAX_SEGMENT_SIZE`.
    pub fn open(dir: &Path, id: SegmentId, mode: Mode) -> Result<Segment, SegmentError> {
        let path = id.data_path(dir);
        let file = match mode {
            Mode::Read => OpenOptions::new().read(true).open(&path),
            Mode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path),
        }
        .map_err(|source| SegmentError::IoAtPath {
            path: path.clone(),
            source,
        })?;

        let len = file
            .metadata()
            .map_err(|source| SegmentError::IoAtPath {
                path: path.clone(),
                source,
            })?
            .len();
        if len > MAX_SEGMENT_SIZE {
            return Err(SegmentError::TooLarge(len));
        }

        Ok(Segment {
            id,
            file,
            write_offset: len,
            mode,
        })
    }

    /// Opens `<id>.data.merge`, always read-write/create, for merge
    /// output.
    pub fn open_merge(dir: &Path, id: SegmentId) -> Result<Segment, SegmentError> {
        let path = id.merge_data_path(dir);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|source| SegmentError::IoAtPath {
                path: path.clone(),
                source,
            })?;
        let write_offset = file
            .metadata()
            .map_err(|source| SegmentError::IoAtPath { path, source })?
            .len();
        Ok(Segment {
            id,
            file,
            write_offset,
            mode: Mode::ReadWrite,
        })
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    pub fn size(&self) -> u64 {
        self.write_offset
    }

    /// True iff appending a record of this shape would exceed the
    /// segment soft cap; callers use this as the pre-check before
    /// `append` to decide whether to rotate onto a new segment first.
    pub fn would_overflow(&self, key_size: u64, value_size: u64) -> bool {
        self.write_offset + Header::SIZE as u64 + key_size + value_size > MAX_SEGMENT_SIZE
    }

    /// Encodes the header, patches in the CRC, gathered-writes
    /// `header | key | value` at the current write offset, and returns
    /// the keydir entry pointing at the value bytes (or at the position
    /// just past the key, for a zero-length tombstone value).
    pub fn append(
        &mut self,
        timestamp: u64,
        key: &[u8],
        value: &[u8],
    ) -> Result<KeydirValue, SegmentError> {
        if self.mode != Mode::ReadWrite {
            return Err(SegmentError::ReadOnly);
        }
        if key.is_empty() {
            return Err(SegmentError::EmptyKey);
        }

        let mut header = Header {
            crc: 0,
            timestamp,
            key_size: key.len() as u32,
            value_size: value.len() as u32,
        }
        .encode();
        let crc_value = crc::compute(&header, key, value);
        header[0..4].copy_from_slice(&crc_value.to_le_bytes());

        let entry_pos = self.write_offset;
        write_gathered(&self.file, &header, key, value, entry_pos)?;

        let total = Header::SIZE as u64 + key.len() as u64 + value.len() as u64;
        self.write_offset += total;

        Ok(KeydirValue {
            segment_id: self.id.0,
            value_pos: entry_pos + Header::SIZE as u64 + key.len() as u64,
            value_size: value.len() as u32,
            timestamp,
        })
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        read_exact_at(&self.file, buf, offset)
    }

    /// Streams `len` bytes starting at `src_offset` in `self` to `dst`
    /// at `dst`'s current write offset, advancing it. Used by merge to
    /// copy live records byte-for-byte without re-deriving their CRC.
    pub fn copy_range(
        &self,
        src_offset: u64,
        len: u64,
        dst: &mut Segment,
    ) -> Result<u64, SegmentError> {
        if dst.mode != Mode::ReadWrite {
            return Err(SegmentError::ReadOnly);
        }
        let dst_start = dst.write_offset;
        let mut remaining = len;
        let mut src_pos = src_offset;
        let mut scratch = [0u8; COPY_CHUNK];
        while remaining > 0 {
            let want = remaining.min(COPY_CHUNK as u64) as usize;
            read_exact_at(&self.file, &mut scratch[..want], src_pos)?;
            crate::io::write_exact_at(&dst.file, &scratch[..want], dst.write_offset)?;
            dst.write_offset += want as u64;
            src_pos += want as u64;
            remaining -= want as u64;
        }
        Ok(dst_start)
    }

    pub fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Removes a `<id>.data.merge` file, ignoring "not found" (abort
    /// paths may race with a partially-completed cleanup).
    pub fn remove_merge(dir: &Path, id: SegmentId) -> std::io::Result<()> {
        match std::fs::remove_file(id.merge_data_path(dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
