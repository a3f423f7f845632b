//! Positional I/O primitives that retry on partial transfer and on
//! interrupted syscalls. A zero-byte read before the buffer is full is
//! treated as failure (EOF) rather than looped on.

use std::fs::File;
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;

/// Reads exactly `buf.len()` bytes from `fd` at `offset`, retrying short
/// reads and `EINTR`. A zero-byte read before `buf` is full is reported
/// as `UnexpectedEof`.
pub fn read_exact_at(fd: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let mut done = 0usize;
    while done < buf.len() {
        match fd.read_at(&mut buf[done..], offset + done as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "short read: fewer bytes available than requested",
                ))
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Writes exactly `buf.len()` bytes to `fd` at `offset`, retrying short
/// writes and `EINTR`.
pub fn write_exact_at(fd: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    let mut done = 0usize;
    while done < buf.len() {
        match fd.write_at(&buf[done..], offset + done as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "write returned zero bytes",
                ))
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Performs a single logical positional write of `header | key | value`
/// at `offset`. Each call to the underlying `write_at` may only cover a
/// prefix of the concatenation; on partial success the slice cursor
/// advances across the three segments until `total` bytes are written.
pub fn write_gathered(
    fd: &File,
    header: &[u8],
    key: &[u8],
    value: &[u8],
    offset: u64,
) -> io::Result<()> {
    let segments = [header, key, value];
    let total: usize = segments.iter().map(|s| s.len()).sum();

    let mut done = 0usize;
    let mut seg_idx = 0usize;
    let mut seg_off = 0usize;

    while done < total {
        // Skip over fully-written leading segments.
        while seg_idx < segments.len() && seg_off == segments[seg_idx].len() {
            seg_idx += 1;
            seg_off = 0;
        }
        let chunk = &segments[seg_idx][seg_off..];
        match fd.write_at(chunk, offset + done as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "write returned zero bytes",
                ))
            }
            Ok(n) => {
                done += n;
                seg_off += n;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn scratch_file() -> (tempfile::TempDir, File) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        (dir, file)
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_dir, file) = scratch_file();
        write_exact_at(&file, b"hello world", 0).unwrap();
        let mut buf = [0u8; 5];
        read_exact_at(&file, &mut buf, 6).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_past_end_is_unexpected_eof() {
        let (_dir, file) = scratch_file();
        write_exact_at(&file, b"abc", 0).unwrap();
        let mut buf = [0u8; 10];
        let err = read_exact_at(&file, &mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn write_gathered_concatenates_three_slices() {
        let (_dir, file) = scratch_file();
        write_gathered(&file, b"HEAD", b"key", b"value", 0).unwrap();
        let mut buf = [0u8; 12];
        read_exact_at(&file, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"HEADkeyvalue");
    }

    #[test]
    fn write_gathered_with_empty_value_is_just_header_and_key() {
        let (_dir, file) = scratch_file();
        write_gathered(&file, b"HD", b"k", b"", 0).unwrap();
        let mut buf = [0u8; 3];
        read_exact_at(&file, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"HDk");
    }
}
