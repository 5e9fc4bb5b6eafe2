//! Scenario 2: repeated overwrites of the same small set of keys exhaust the active area's free
//! space and force a compaction, which must preserve every live value and reclaim the dead ones.

mod common;

use common::FakeFlash;
use flashkv::Store;

fn dev() -> FakeFlash {
    // Small area on purpose: a handful of overwrites is enough to force at least one compaction.
    FakeFlash::new(512 * 4, 512, 8, 1)
}

#[test]
fn repeated_overwrite_triggers_compaction_and_preserves_values() {
    let mut store = Store::init(0, 512 * 4, dev()).unwrap();

    for round in 0u8..40 {
        let val = [round; 12];
        store.write("hot-key", &val).unwrap();
        store.write("cold-key", b"stable").unwrap();

        let mut buf = [0u8; 12];
        let n = store.read("hot-key", &mut buf).unwrap();
        assert_eq!(&buf[..n as usize], &val[..]);

        let mut cold_buf = [0u8; 8];
        let n = store.read("cold-key", &mut cold_buf).unwrap();
        assert_eq!(&cold_buf[..n as usize], b"stable");
    }

    // area never grows without bound: compaction must have run to keep writes succeeding
    assert!(store.size() <= 512 * 2);
}

#[test]
fn survives_reinit_after_compaction() {
    let mut raw = dev();
    {
        let mut store = Store::init(0, 512 * 4, &mut raw).unwrap();
        for round in 0u8..40 {
            store.write("k", &[round; 10]).unwrap();
        }
    }

    let mut store = Store::init(0, 512 * 4, &mut raw).unwrap();
    let mut buf = [0u8; 10];
    let n = store.read("k", &mut buf).unwrap();
    assert_eq!(&buf[..n as usize], &[39u8; 10]);
}
