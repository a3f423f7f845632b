//! End-to-end scenarios exercising the store through its public API
//! only. Kept here rather than inline `#[cfg(test)]` because each one
//! drives `Store` as a black box across open/close boundaries.

use std::fs;

use sunset_db::{Error, Options, Store};

fn big_value() -> Vec<u8> {
    vec![0xABu8; 10 * 1024 * 1024]
}

#[test]
fn s1_basic() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = Store::open(dir.path(), Options::read_write()).unwrap();

    store.put(b"alpha", b"one").unwrap();
    store.put(b"beta", b"two").unwrap();
    assert_eq!(store.get(b"alpha").unwrap(), b"one");

    store.delete(b"alpha").unwrap();
    assert!(store.get(b"alpha").unwrap_err().is_not_found());
}

#[test]
fn s2_persistence() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = Store::open(dir.path(), Options::read_write()).unwrap();
        store.put(b"persist", b"hello-world").unwrap();
        store.close();
    }
    let mut store = Store::open(dir.path(), Options::read_write()).unwrap();
    assert_eq!(store.get(b"persist").unwrap(), b"hello-world");
}

#[test]
fn s3_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let value = big_value();
    let mut store = Store::open(dir.path(), Options::read_write()).unwrap();

    let first_key = 0u64.to_le_bytes();
    store.put(&first_key, &value).unwrap();
    let mut last_key = first_key;
    let mut i = 1u64;
    while !dir.path().join("0000000002.data").exists() {
        last_key = i.to_le_bytes();
        store.put(&last_key, &value).unwrap();
        i += 1;
        assert!(i < 100, "expected rotation onto segment 2 well before 100 puts");
    }

    assert_eq!(store.get(&first_key).unwrap(), value);
    assert_eq!(store.get(&last_key).unwrap(), value);
    store.close();

    let mut reopened = Store::open(dir.path(), Options::read_write()).unwrap();
    assert_eq!(reopened.get(&first_key).unwrap(), value);
    assert_eq!(reopened.get(&last_key).unwrap(), value);
}

#[test]
fn s4_corruption_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = Store::open(dir.path(), Options::read_write()).unwrap();
        store.put(b"k", b"hello").unwrap();
        store.sync().unwrap();
        store.close();
    }

    let data_path = dir.path().join("0000000001.data");
    let mut bytes = fs::read(&data_path).unwrap();
    let value_offset = bytes.len() - "hello".len();
    bytes[value_offset] ^= 0xFF;
    fs::write(&data_path, bytes).unwrap();

    let reopened = Store::open(dir.path(), Options::read_write());
    assert!(matches!(reopened, Err(Error::Corrupt(_))));
}

#[test]
fn s5_read_only_rejects_mutation() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = Store::open(dir.path(), Options::read_write()).unwrap();
        store.put(b"alpha", b"one").unwrap();
        store.put(b"beta", b"two").unwrap();
        store.delete(b"alpha").unwrap();
        store.sync().unwrap();
        store.close();
    }

    let mut store = Store::open(dir.path(), Options::READ_ONLY).unwrap();
    assert_eq!(store.get(b"beta").unwrap(), b"two");
    assert!(store.put(b"x", b"y").is_err());
    assert!(store.delete(b"beta").is_err());
}

#[test]
fn s6_merge_compacts() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut seed = Store::open(dir.path(), Options::read_write()).unwrap();
        seed.put(b"alpha", b"alpha-v1").unwrap();
        seed.put(b"beta", b"beta-v1").unwrap();
        seed.put(b"gamma", b"gamma-v1").unwrap();
        seed.sync().unwrap();
        seed.close();
    }
    {
        let mut seed = Store::open(dir.path(), Options::read_write()).unwrap();
        seed.put(b"alpha", b"alpha-v2").unwrap();
        seed.delete(b"beta").unwrap();
        seed.put(b"delta", b"delta-v1").unwrap();
        seed.sync().unwrap();
        seed.close();
    }

    let mut store = Store::open(dir.path(), Options::read_write()).unwrap();
    store.put(b"gamma", b"gamma-active").unwrap();

    store.merge().unwrap();

    assert_eq!(store.get(b"alpha").unwrap(), b"alpha-v2");
    assert!(store.get(b"beta").unwrap_err().is_not_found());
    assert_eq!(store.get(b"gamma").unwrap(), b"gamma-active");
    assert_eq!(store.get(b"delta").unwrap(), b"delta-v1");

    assert!(!dir.path().join("0000000001.data").exists());
    assert!(!dir.path().join("0000000002.data").exists());
    assert!(dir.path().join("0000000004.data").exists());
    assert!(dir.path().join("0000000004.hint").exists());

    for entry in fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        assert!(
            path.extension().and_then(|e| e.to_str()) != Some("merge"),
            "stray merge artifact: {path:?}"
        );
    }
}
