//! Scenario 5: a power loss that interrupts a program operation leaves a record whose header (or
//! tail) reads back erased or inconsistent; recovery must treat it as the live end of the log, not
//! as corruption, and must never expose the partially written key.

mod common;

use common::FakeFlash;
use flashkv::Store;

#[test]
fn truncated_tail_write_is_treated_as_end_of_log() {
    let mut raw = FakeFlash::new(4096 * 4, 4096, 8, 1);
    let write_offset;
    {
        let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();
        store.write("safe", b"committed").unwrap();
        write_offset = store.size();
        store.write("interrupted", b"never-finishes").unwrap();
    }

    // Simulate the device losing power partway through programming "interrupted": everything
    // from the point right after "safe" onward reverts to the erased state.
    raw.truncate_program_at(write_offset);

    let mut store = Store::init(0, 4096 * 4, &mut raw).unwrap();
    assert!(store.contains_key("safe").unwrap());
    assert!(!store.contains_key("interrupted").unwrap());

    let mut buf = [0u8; 16];
    let n = store.read("safe", &mut buf).unwrap();
    assert_eq!(&buf[..n as usize], b"committed");

    // The store must remain writable after recovering from the truncated tail.
    store.write("after-recovery", b"ok").unwrap();
    assert!(store.contains_key("after-recovery").unwrap());
}
