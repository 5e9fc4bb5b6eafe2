//! Scenario 6: `reset()` wipes every key and leaves a freshly compacted store with only the
//! anchor accounted for.

mod common;

use common::FakeFlash;
use flashkv::record;
use flashkv::Store;

fn dev() -> FakeFlash {
    FakeFlash::new(4096 * 4, 4096, 8, 1)
}

#[test]
fn reset_wipes_every_key() {
    let mut store = Store::init(0, 4096 * 4, dev()).unwrap();

    for i in 0..20 {
        store
            .write(&format!("k{i}"), format!("v{i}").as_bytes())
            .unwrap();
    }
    assert!(store.size() > 0);

    store.reset().unwrap();

    for i in 0..20 {
        assert!(!store.contains_key(&format!("k{i}")).unwrap());
    }

    // After reset, only the anchor record is accounted for.
    let anchor_size = record::record_size(record::AREA_ANCHOR_KEY.len() as u16, 4, 8);
    assert_eq!(store.size(), anchor_size);

    // Only the anchor remains; writing afterward works normally.
    let size_after_reset = store.size();
    store.write("fresh", b"value").unwrap();
    assert!(store.size() > size_after_reset);
    let mut buf = [0u8; 8];
    let n = store.read("fresh", &mut buf).unwrap();
    assert_eq!(&buf[..n as usize], b"value");
}

#[test]
fn reset_survives_reinit() {
    let mut raw = dev();
    {
        let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();
        store.write("a", b"1").unwrap();
        store.write("b", b"2").unwrap();
        store.reset().unwrap();
    }

    let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();
    assert!(!store.contains_key("a").unwrap());
    assert!(!store.contains_key("b").unwrap());
}
