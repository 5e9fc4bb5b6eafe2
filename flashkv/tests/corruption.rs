//! Scenario 4: a single bit flip in a stored record is caught by its CRC, and the read of that
//! key fails, without corrupting access to the rest of the store.

mod common;

use common::FakeFlash;
use flashkv::{Error, Store};

#[test]
fn bit_flip_in_payload_fails_crc_on_read() {
    let mut raw = FakeFlash::new(4096 * 4, 4096, 8, 1);
    let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();

    store.write("victim", b"untouched value").unwrap();
    store.write("other", b"fine").unwrap();
    drop(store);

    // Anchor record occupies the first record_size() bytes; the first user record starts right
    // after it. Flip a bit well inside "victim"'s payload bytes.
    raw.flip_bit(64, 0);

    let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();
    let mut buf = [0u8; 32];
    let err = store.read("victim", &mut buf);
    assert!(err.is_err());
    match err {
        Err(Error::InvalidData) | Err(Error::ItemNotFound) => {}
        other => panic!("expected a corruption-flavored error, got {other:?}"),
    }
}

#[test]
fn scan_flags_recovery_and_still_serves_valid_keys() {
    let mut raw = FakeFlash::new(4096 * 4, 4096, 8, 1);
    {
        let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();
        for i in 0..10 {
            store
                .write(&format!("k{i}"), format!("v{i}").as_bytes())
                .unwrap();
        }
    }

    // Corrupt somewhere in the middle of the written records by flipping a header magic bit,
    // forcing the scanner to stop early and mark the area for recovery-by-compaction.
    raw.flip_bit(200, 3);

    // Re-opening must still succeed: recovery runs automatically during init.
    let store = Store::init(0, 4096 * 4, &mut raw);
    assert!(store.is_ok());
}
