//! CRC-32 (IEEE, reflected polynomial 0xEDB88320) over
//! `header[timestamp..] || key || value`.
//!
//! `crc32fast` already implements exactly this variant (init 0xFFFFFFFF,
//! final XOR 0xFFFFFFFF, reflected input/output) and is table-driven
//! internally, so we build on it rather than hand-roll a table.

use crate::record::{Header, HEADER_TIMESTAMP_OFFSET};

/// Chunk size used when streaming value bytes off disk for checksum
/// validation.
const STREAM_CHUNK: usize = 4096;

/// Computes the CRC over an in-memory header tail, key, and value.
pub fn compute(header: &[u8; Header::SIZE], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[HEADER_TIMESTAMP_OFFSET..]);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Recomputes the CRC for a record whose value bytes live on disk at
/// `value_pos`, streaming them in `STREAM_CHUNK`-sized reads, and
/// compares against `expected`.
///
/// Returns `Ok(true)` iff the checksums match. Any short read surfaces as
/// an `io::Error` rather than a silent `false`, matching `pread_exact`'s
/// fail-don't-retry-forever behavior in the original C source.
pub fn validate(
    expected: u32,
    header: &[u8; Header::SIZE],
    key: &[u8],
    fd: &std::fs::File,
    value_pos: u64,
    value_size: u32,
) -> std::io::Result<bool> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[HEADER_TIMESTAMP_OFFSET..]);
    hasher.update(key);

    let mut remaining = value_size as u64;
    let mut pos = value_pos;
    let mut scratch = [0u8; STREAM_CHUNK];
    while remaining > 0 {
        let want = remaining.min(STREAM_CHUNK as u64) as usize;
        crate::io::read_exact_at(fd, &mut scratch[..want], pos)?;
        hasher.update(&scratch[..want]);
        remaining -= want as u64;
        pos += want as u64;
    }

    Ok(hasher.finalize() == expected)
}
