//! Scenario 3: a large number of keys written, deleted and rewritten under constant churn, with
//! every live value checked against a shadow model after each round.

mod common;

use std::collections::BTreeMap;

use common::FakeFlash;
use flashkv::Store;

fn dev() -> FakeFlash {
    FakeFlash::new(4096 * 8, 4096, 8, 1)
}

#[test]
fn fill_delete_rewrite_stress() {
    let mut store = Store::init(0, 4096 * 8, dev()).unwrap();
    let mut model: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    const KEYS: usize = 200;

    // Seed every key.
    for i in 0..KEYS {
        let key = format!("key-{i:04}");
        let value = vec![(i % 251) as u8; (i % 24) + 1];
        store.write(&key, &value).unwrap();
        model.insert(key, value);
    }

    // Churn: delete every third key, rewrite every fifth with a new value, leave the rest.
    for i in 0..KEYS {
        let key = format!("key-{i:04}");
        if i % 3 == 0 {
            store.delete(&key).unwrap();
            model.remove(&key);
        } else if i % 5 == 0 {
            let value = vec![(i % 199) as u8; (i % 30) + 2];
            store.write(&key, &value).unwrap();
            model.insert(key, value);
        }
    }

    // Verify the whole model survived the churn.
    let mut buf = [0u8; 64];
    for (key, value) in &model {
        assert!(store.contains_key(key).unwrap(), "missing {key}");
        let n = store.read(key, &mut buf).unwrap();
        assert_eq!(&buf[..n as usize], value.as_slice(), "mismatch for {key}");
    }

    // And every deleted key is gone.
    for i in (0..KEYS).step_by(3) {
        let key = format!("key-{i:04}");
        assert!(!store.contains_key(&key).unwrap(), "should be gone: {key}");
    }
}
