//! Store controller: directory layout, open/recovery, put/get/delete,
//! active-segment rotation, sync, close, and merge.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ArgumentError, CorruptionError, Error};
use crate::hint::{self, HintFile};
use crate::keydir::{KeyDirectory, KeydirValue};
use crate::options::Options;
use crate::record::{Header, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::segment::{Mode, Segment, SegmentId};

/// An open handle to a `sunset-db` directory.
///
/// Not thread-safe for mutation: `put`, `delete`, `merge`, `sync`, and
/// `close` all take `&mut self`, so the borrow checker enforces a
/// single-writer contract structurally rather than by convention.
/// Concurrent reads through a read-only handle are safe since they only
/// perform positional reads of immutable file content.
pub struct Store {
    dir: PathBuf,
    options: Options,
    keydir: KeyDirectory,
    active: Option<Segment>,
    /// Sealed, read-only segments, kept sorted ascending by id.
    inactive: Vec<Segment>,
    next_id: u32,
    last_timestamp: u64,
}

impl Store {
    /// Opens (and if necessary creates) a store directory.
    ///
    /// Recovery ordering: for each segment id ascending, a hint with the
    /// same id rebuilds the index without a CRC scan; absent a hint, the
    /// segment is scanned record-by-record with full CRC validation. Any
    /// validation failure fails the whole open — no silent truncation.
    pub fn open(dir: impl AsRef<Path>, options: Options) -> Result<Store, Error> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.is_dir() {
            if options.is_read_write() {
                fs::create_dir(&dir)?;
                set_dir_permissions(&dir)?;
                log::info!("created store directory {}", dir.display());
            } else {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", dir.display()),
                )));
            }
        }

        let (mut data_ids, hint_ids) = scan_directory(&dir)?;
        data_ids.sort_unstable();

        if data_ids.is_empty() && !options.is_read_write() {
            return Err(Error::InvalidArgument(ArgumentError::NoSegments));
        }

        let mut inactive = Vec::with_capacity(data_ids.len());
        for &id in &data_ids {
            inactive.push(Segment::open(&dir, SegmentId(id), Mode::Read)?);
        }

        let mut keydir = KeyDirectory::new();
        for segment in &inactive {
            if hint_ids.contains(&segment.id.0) {
                log::debug!("recovering segment {} from hint", segment.id.0);
                apply_hint(&dir, segment.id, &mut keydir)?;
            } else {
                log::debug!("recovering segment {} via full scan", segment.id.0);
                scan_segment_into_keydir(segment, &mut keydir)?;
            }
        }

        let mut next_id = data_ids.last().map(|&id| id + 1).unwrap_or(1);

        let active = if options.is_read_write() {
            let id = SegmentId(next_id);
            next_id += 1;
            Some(Segment::open(&dir, id, Mode::ReadWrite)?)
        } else {
            None
        };

        log::info!(
            "opened {} ({} inactive segments, {} live keys)",
            dir.display(),
            inactive.len(),
            keydir.live_count()
        );

        Ok(Store {
            dir,
            options,
            keydir,
            active,
            inactive,
            next_id,
            last_timestamp: 0,
        })
    }

    /// Looks up `key` and returns a fresh copy of its current value, or
    /// `Error::KeyNotFound` if absent. Does not re-validate the record's
    /// checksum: records are trusted once validated at open time, until
    /// the next reopen.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let meta = *self.keydir.get(key).ok_or(Error::KeyNotFound)?;
        let segment = self.segment_by_id(meta.segment_id).ok_or(Error::KeyNotFound)?;
        let mut buf = vec![0u8; meta.value_size as usize];
        segment.read_at(meta.value_pos, &mut buf)?;
        Ok(buf)
    }

    /// Inserts or overwrites `key`. Fails on a read-only handle or on a
    /// key/value exceeding the size caps. Rotates the active segment
    /// first if the record would overflow it.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.check_writable()?;
        self.check_put_sizes(key, value)?;

        if self
            .active
            .as_ref()
            .expect("read-write store always has an active segment")
            .would_overflow(key.len() as u64, value.len() as u64)
        {
            self.rotate()?;
        }

        let timestamp = self.next_timestamp();
        let active = self.active.as_mut().expect("checked above");
        let meta = active.append(timestamp, key, value)?;

        if value.is_empty() {
            self.keydir.delete(key);
        } else {
            self.keydir.put(key, meta);
        }

        if self.options.is_sync_on_put() {
            active.sync()?;
        }

        Ok(())
    }

    /// Appends a tombstone for `key`. Always succeeds and always appends
    /// a record, even if `key` is not currently present — deletion is
    /// idempotent at the storage level.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.put(key, &[])
    }

    /// Fsyncs the active segment.
    pub fn sync(&mut self) -> Result<(), Error> {
        self.check_writable()?;
        self.active
            .as_ref()
            .expect("checked above")
            .sync()
            .map_err(Error::from)
    }

    /// Syncs (best effort) and closes every open segment. Safe to call on
    /// a half-opened handle; sync failures are logged, not propagated.
    pub fn close(mut self) {
        if let Some(active) = &self.active {
            if let Err(e) = active.sync() {
                log::warn!("close: active segment sync failed: {e}");
            }
        }
        self.active = None;
        self.inactive.clear();
    }

    /// Compacts all inactive segments: live records are copied forward
    /// into a fresh run of segments (with accompanying hints), the old
    /// inactive segments are unlinked, and the key directory is rebuilt
    /// from the new segments plus a re-scan of the (untouched) active
    /// segment.
    ///
    /// Concurrent callers must not run `merge` alongside `put`/`delete`/
    /// `get`/`close` on the same handle — this is the caller's
    /// responsibility, not enforced internally.
    pub fn merge(&mut self) -> Result<(), Error> {
        self.check_writable()?;
        if self.inactive.is_empty() {
            return Err(Error::InvalidArgument(ArgumentError::NothingToMerge));
        }

        let bytes_before: u64 = self.inactive.iter().map(|s| s.size()).sum();
        log::info!(
            "merge: starting over {} inactive segments ({bytes_before} bytes)",
            self.inactive.len()
        );

        match self.run_merge() {
            Ok(bytes_after) => {
                log::info!(
                    "merge: complete, {} inactive segments remain ({} bytes reclaimed)",
                    self.inactive.len(),
                    bytes_before.saturating_sub(bytes_after)
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("merge: aborted ({e}), unwinding merge artifacts");
                Err(e)
            }
        }
    }

    /// Runs the merge pipeline, returning the total on-disk size of the
    /// resulting inactive segments (used by `merge` to log bytes reclaimed).
    fn run_merge(&mut self) -> Result<u64, Error> {
        let mut pairs = MergeWriter::new(&self.dir, self.next_id);

        let result = self.copy_all_live_records(&mut pairs);

        if let Err(e) = result {
            pairs.abort();
            return Err(e);
        }

        let merged_ids = pairs.committed_ids();
        let last_allocated_id = pairs.last_allocated_id();

        rename_merge_artifacts(&self.dir, &merged_ids)?;

        let old_inactive = std::mem::take(&mut self.inactive);
        for segment in &old_inactive {
            fs::remove_file(segment.id.data_path(&self.dir))?;
            hint::remove_hint(&self.dir, segment.id)?;
        }
        drop(old_inactive);

        let mut new_inactive = Vec::with_capacity(merged_ids.len());
        for &id in &merged_ids {
            new_inactive.push(Segment::open(&self.dir, SegmentId(id), Mode::Read)?);
        }
        let bytes_after: u64 = new_inactive.iter().map(|s| s.size()).sum();
        self.inactive = new_inactive;
        self.next_id = last_allocated_id + 1;

        let mut keydir = KeyDirectory::new();
        for segment in &self.inactive {
            apply_hint(&self.dir, segment.id, &mut keydir)?;
        }
        if let Some(active) = &self.active {
            scan_segment_into_keydir(active, &mut keydir)?;
        }
        self.keydir = keydir;

        Ok(bytes_after)
    }

    /// Copies every live record out of every inactive segment, then
    /// finalizes (or discards, if empty) the last output pair.
    fn copy_all_live_records(&self, pairs: &mut MergeWriter) -> Result<(), Error> {
        for source in &self.inactive {
            self.copy_live_records(source, pairs)?;
        }
        pairs.finalize_last()
    }

    /// Copies every record in `source` that the current key directory
    /// still considers live into `pairs`' current output segment,
    /// emitting a matching hint row.
    fn copy_live_records(&self, source: &Segment, pairs: &mut MergeWriter) -> Result<(), Error> {
        let len = source.size();
        let mut offset = 0u64;
        while offset < len {
            let mut header_buf = [0u8; Header::SIZE];
            source.read_at(offset, &mut header_buf)?;
            let header = Header::decode(&header_buf);

            let key_size = header.key_size as u64;
            let value_size = header.value_size as u64;
            let total = Header::SIZE as u64 + key_size + value_size;

            let mut key = vec![0u8; header.key_size as usize];
            source.read_at(offset + Header::SIZE as u64, &mut key)?;

            let value_pos = offset + Header::SIZE as u64 + key_size;
            let is_live = self.keydir.get(&key).is_some_and(|meta| {
                meta.segment_id == source.id.0
                    && meta.value_pos == value_pos
                    && meta.value_size > 0
            });

            if is_live {
                pairs.copy_record(source, offset, total, header.timestamp, header.value_size, &key)?;
            }

            offset += total;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), Error> {
        let old = self.active.take().expect("read-write store has an active segment");
        old.sync()?;
        let id = old.id;
        drop(old);
        let sealed = Segment::open(&self.dir, id, Mode::Read)?;
        log::info!("rotating: sealed segment {} as inactive", id.0);
        self.inactive.push(sealed);

        let new_id = SegmentId(self.next_id);
        self.next_id += 1;
        self.active = Some(Segment::open(&self.dir, new_id, Mode::ReadWrite)?);
        Ok(())
    }

    fn segment_by_id(&mut self, id: u32) -> Option<&mut Segment> {
        if self.active.as_ref().is_some_and(|s| s.id.0 == id) {
            return self.active.as_mut();
        }
        self.inactive.iter_mut().find(|s| s.id.0 == id)
    }

    fn check_writable(&self) -> Result<(), Error> {
        if !self.options.is_read_write() {
            return Err(Error::InvalidArgument(ArgumentError::ReadOnly));
        }
        Ok(())
    }

    fn check_put_sizes(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidArgument(ArgumentError::EmptyKey));
        }
        if key.len() as u64 > MAX_KEY_SIZE {
            return Err(Error::InvalidArgument(ArgumentError::KeyTooLarge {
                got: key.len() as u64,
                max: MAX_KEY_SIZE,
            }));
        }
        if value.len() as u64 > MAX_VALUE_SIZE {
            return Err(Error::InvalidArgument(ArgumentError::ValueTooLarge {
                got: value.len() as u64,
                max: MAX_VALUE_SIZE,
            }));
        }
        Ok(())
    }

    /// Samples a nanosecond timestamp, bumping it past the previous
    /// sample so that within one process run, timestamp order always
    /// matches call order even when the system clock has coarser
    /// resolution than the put rate.
    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let ts = now.max(self.last_timestamp + 1);
        self.last_timestamp = ts;
        ts
    }
}

/// Scans a sealed segment record-by-record, validating every checksum,
/// and applies each record to `keydir` (tombstones deleting prior
/// entries). Fails the whole open on the first corruption or short read.
fn scan_segment_into_keydir(segment: &Segment, keydir: &mut KeyDirectory) -> Result<(), Error> {
    let len = segment.size();
    let mut offset = 0u64;
    while offset < len {
        let mut header_buf = [0u8; Header::SIZE];
        segment.read_at(offset, &mut header_buf)?;
        let header = Header::decode(&header_buf);

        if header.key_size == 0 {
            return Err(Error::Corrupt(CorruptionError::HeaderOutOfRange(
                "key_size is zero".to_string(),
            )));
        }
        if header.key_size as u64 > MAX_KEY_SIZE || header.value_size as u64 > MAX_VALUE_SIZE {
            return Err(Error::Corrupt(CorruptionError::HeaderOutOfRange(format!(
                "key_size={} value_size={} exceed caps",
                header.key_size, header.value_size
            ))));
        }

        let total = Header::SIZE as u64 + header.key_size as u64 + header.value_size as u64;
        if offset + total > len {
            return Err(Error::Corrupt(CorruptionError::PayloadPastEnd {
                segment_id: segment.id.0,
            }));
        }

        let mut key = vec![0u8; header.key_size as usize];
        segment.read_at(offset + Header::SIZE as u64, &mut key)?;

        let value_pos = offset + Header::SIZE as u64 + header.key_size as u64;
        let valid = crate::crc::validate(
            header.crc,
            &header_buf,
            &key,
            segment.file(),
            value_pos,
            header.value_size,
        )?;
        if !valid {
            let mut value = vec![0u8; header.value_size as usize];
            segment.read_at(value_pos, &mut value)?;
            let expected = crate::crc::compute(&header_buf, &key, &value);
            return Err(Error::Corrupt(CorruptionError::ChecksumMismatch {
                segment_id: segment.id.0,
                offset,
                expected,
                found: header.crc,
            }));
        }

        if header.is_tombstone() {
            keydir.delete(&key);
        } else {
            keydir.put(
                &key,
                KeydirValue {
                    segment_id: segment.id.0,
                    value_pos,
                    value_size: header.value_size,
                    timestamp: header.timestamp,
                },
            );
        }

        offset += total;
    }
    Ok(())
}

/// Rebuilds the key directory entries contributed by one segment from
/// its hint sidecar, with no CRC check (the hint's presence is itself the
/// claim that the segment was already validated).
fn apply_hint(dir: &Path, id: SegmentId, keydir: &mut KeyDirectory) -> Result<(), Error> {
    let hint = HintFile::open(dir, id)?;
    for row in hint.read_rows()? {
        keydir.put(
            &row.key,
            KeydirValue {
                segment_id: id.0,
                value_pos: row.value_pos as u64,
                value_size: row.value_size,
                timestamp: row.timestamp,
            },
        );
    }
    Ok(())
}

/// Lists `<u32>.data` and `<u32>.hint` entries in `dir`. Any other name
/// (including stray `.data.merge`/`.hint.merge` artifacts left behind by
/// an interrupted merge) is ignored: opening does not attempt automatic
/// repair.
fn scan_directory(dir: &Path) -> Result<(Vec<u32>, std::collections::HashSet<u32>), Error> {
    let mut data_ids = Vec::new();
    let mut hint_ids = std::collections::HashSet::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext,
            None => continue,
        };
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        if stem.is_empty() || stem.len() > 10 || !stem.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let id: u32 = match stem.parse() {
            Ok(id) => id,
            Err(_) => continue,
        };
        match ext {
            "data" => data_ids.push(id),
            "hint" => {
                hint_ids.insert(id);
            }
            _ => {}
        }
    }

    Ok((data_ids, hint_ids))
}

#[cfg(unix)]
fn set_dir_permissions(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_dir_permissions(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Tracks the sequence of `<id>.data.merge`/`<id>.hint.merge` pairs
/// produced by one merge pass. A new pair opens whenever the current
/// output segment would overflow the soft cap.
struct MergeWriter {
    dir: PathBuf,
    current_id: u32,
    current_segment: Segment,
    current_hint: HintFile,
    /// Ids of pairs finalized so far (oldest first), not counting
    /// `current_id` until it too is finalized.
    committed: Vec<u32>,
}

impl MergeWriter {
    fn new(dir: &Path, starting_id: u32) -> MergeWriter {
        // Constructing the first pair cannot fail in practice (fresh
        // ids, writable directory already verified by `Store::open`),
        // but plumbing a Result through every call site for a path this
        // narrow isn't worth it; open failures here mirror ordinary
        // segment-open failures and panic with a clear message instead.
        let current_segment = Segment::open_merge(dir, SegmentId(starting_id))
            .expect("opening a fresh merge segment cannot fail under a writable store directory");
        let current_hint = HintFile::open_merge(dir, SegmentId(starting_id))
            .expect("opening a fresh merge hint cannot fail under a writable store directory");
        MergeWriter {
            dir: dir.to_path_buf(),
            current_id: starting_id,
            current_segment,
            current_hint,
            committed: Vec::new(),
        }
    }

    fn last_allocated_id(&self) -> u32 {
        self.current_id
    }

    /// Copies one live record into the current output pair, opening a
    /// fresh pair first if it would not fit.
    fn copy_record(
        &mut self,
        source: &Segment,
        src_offset: u64,
        total_len: u64,
        timestamp: u64,
        value_size: u32,
        key: &[u8],
    ) -> Result<(), Error> {
        if self
            .current_segment
            .would_overflow(key.len() as u64, value_size as u64)
            && self.current_segment.size() > 0
        {
            self.advance_pair()?;
        }

        let dst_start = source.copy_range(src_offset, total_len, &mut self.current_segment)?;
        let new_value_pos = dst_start + Header::SIZE as u64 + key.len() as u64;
        self.current_hint
            .append(timestamp, value_size, new_value_pos as u32, key)?;
        Ok(())
    }

    fn advance_pair(&mut self) -> Result<(), Error> {
        self.finalize_current()?;
        self.current_id += 1;
        self.current_segment = Segment::open_merge(&self.dir, SegmentId(self.current_id))?;
        self.current_hint = HintFile::open_merge(&self.dir, SegmentId(self.current_id))?;
        Ok(())
    }

    fn finalize_current(&mut self) -> Result<(), Error> {
        self.current_segment.sync()?;
        self.current_hint.sync()?;
        log::debug!(
            "merge: finalized pair {} ({} bytes)",
            self.current_id,
            self.current_segment.size()
        );
        self.committed.push(self.current_id);
        Ok(())
    }

    /// Finalizes the last pair, unless it received no live records at
    /// all, in which case its files are deleted instead.
    fn finalize_last(&mut self) -> Result<(), Error> {
        if self.current_segment.size() == 0 {
            Segment::remove_merge(&self.dir, SegmentId(self.current_id))?;
            hint::remove_merge_hint(&self.dir, SegmentId(self.current_id))?;
        } else {
            self.finalize_current()?;
        }
        Ok(())
    }

    fn committed_ids(&self) -> Vec<u32> {
        self.committed.clone()
    }

    /// Unwinds every `.merge` artifact produced so far, including the
    /// currently-open (uncommitted) pair.
    fn abort(&mut self) {
        let mut ids = self.committed.clone();
        if !ids.contains(&self.current_id) {
            ids.push(self.current_id);
        }
        for id in ids {
            let _ = Segment::remove_merge(&self.dir, SegmentId(id));
            let _ = hint::remove_merge_hint(&self.dir, SegmentId(id));
        }
    }
}

/// Renames every `<id>.data.merge -> <id>.data` and
/// `<id>.hint.merge -> <id>.hint` for `ids`, data before hint within each
/// id.
fn rename_merge_artifacts(dir: &Path, ids: &[u32]) -> Result<(), Error> {
    for &id in ids {
        let id = SegmentId(id);
        fs::rename(id.merge_data_path(dir), id.data_path(dir))?;
        fs::rename(hint::merge_hint_path(dir, id), hint::hint_path(dir, id))?;
    }
    Ok(())
}
