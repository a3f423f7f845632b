use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error returned from every `Store` operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument")]
    InvalidArgument(#[from] ArgumentError),

    #[error("corrupt on-disk state")]
    Corrupt(#[from] CorruptionError),

    #[error("key not found")]
    KeyNotFound,

    #[error("segment error")]
    Segment(#[from] SegmentError),

    #[error("hint file error")]
    Hint(#[from] HintError),

    #[error("IO error")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound)
    }
}

#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("key is empty")]
    EmptyKey,

    #[error("key exceeds max size (expected <= {max}, got {got})")]
    KeyTooLarge { got: u64, max: u64 },

    #[error("value exceeds max size (expected <= {max}, got {got})")]
    ValueTooLarge { got: u64, max: u64 },

    #[error("unknown option bits: {0:#010b}")]
    UnknownOptionBits(u8),

    #[error("store is read-only")]
    ReadOnly,

    #[error("merge requires at least one inactive segment")]
    NothingToMerge,

    #[error("store directory has no segments to open read-only")]
    NoSegments,
}

#[derive(Error, Debug)]
pub enum CorruptionError {
    #[error(
        "checksum mismatch in segment {segment_id} at offset {offset} \
         (expected {expected:#010x}, found {found:#010x})"
    )]
    ChecksumMismatch {
        segment_id: u32,
        offset: u64,
        expected: u32,
        found: u32,
    },

    #[error("record header field out of range: {0}")]
    HeaderOutOfRange(String),

    #[error("record payload extends past end of segment {segment_id}")]
    PayloadPastEnd { segment_id: u32 },
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("segment file too large: {0} bytes")]
    TooLarge(u64),

    #[error("cannot parse segment id from path {0:?}")]
    InvalidPath(PathBuf),

    #[error("segment is read-only")]
    ReadOnly,

    #[error("record key is empty")]
    EmptyKey,

    #[error("IO error at path {path:?}")]
    IoAtPath { path: PathBuf, source: io::Error },

    #[error("IO error")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum HintError {
    #[error("IO error")]
    Io(#[from] io::Error),
}
