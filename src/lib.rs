//! `sunset-db`: an embedded, single-writer, log-structured key/value
//! store in the Bitcask tradition. Keys and values are opaque byte
//! strings; every write is an append to the active segment, and an
//! in-memory key directory points each live key at its most recent
//! record.

mod crc;
mod error;
mod hint;
mod io;
mod keydir;
mod options;
mod record;
mod segment;
mod store;

pub use error::{ArgumentError, CorruptionError, Error, HintError, SegmentError};
pub use options::Options;
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_put_get_delete_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path(), Options::read_write()).unwrap();

        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v");

        store.delete(b"k").unwrap();
        assert!(store.get(b"k").unwrap_err().is_not_found());
    }
}
