//! The in-RAM index: a sorted-by-hash directory of live records, `{hash, offset}`, grown by
//! doubling on demand. Collisions are permitted; lookups that hit a hash match still need to
//! verify the full key on media before trusting the entry.

extern crate alloc;
use alloc::collections::TryReserveError;
use alloc::vec::Vec;

/// Initial capacity of a freshly built index.
pub const INITIAL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: u16,
    pub offset: u32,
}

pub(crate) struct RamIndex {
    entries: Vec<IndexEntry>,
}

impl RamIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, pos: usize) -> IndexEntry {
        self.entries[pos]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// First index `i` where `entries[i].hash >= hash`, or `len()` if none. Because the table
    /// stays sorted by hash, this is both the lookup-scan stopping point and the correct
    /// insertion position for a new entry with this hash.
    pub fn find_insert_pos(&self, hash: u16) -> usize {
        self.entries.partition_point(|e| e.hash < hash)
    }

    /// Grow (doubling, from an initial capacity of [`INITIAL_CAPACITY`]) if the table is
    /// currently full. Exposed separately from [`Self::insert`] so a caller can guarantee the
    /// allocation happens, and can fail, before any corresponding media write (per the "grow on
    /// insert... on allocation failure, fail before touching media" rule).
    pub fn ensure_capacity_for_one(&mut self) -> Result<(), TryReserveError> {
        if self.entries.len() == self.entries.capacity() {
            let additional = if self.entries.capacity() == 0 {
                INITIAL_CAPACITY
            } else {
                self.entries.capacity()
            };
            self.entries.try_reserve_exact(additional)?;
        }
        Ok(())
    }

    /// Grow if needed, then shift the tail right and insert `entry` at `pos`.
    pub fn insert(&mut self, pos: usize, entry: IndexEntry) -> Result<(), TryReserveError> {
        self.ensure_capacity_for_one()?;
        self.entries.insert(pos, entry);
        Ok(())
    }

    /// Shift the tail left over the entry at `pos`.
    pub fn remove(&mut self, pos: usize) {
        self.entries.remove(pos);
    }

    /// Overwrite the entry at `pos` in place (no shift, no growth).
    pub fn update(&mut self, pos: usize, entry: IndexEntry) {
        self.entries[pos] = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_order() {
        let mut idx = RamIndex::new();
        for (hash, offset) in [(30u16, 0u32), (10, 1), (20, 2)] {
            let pos = idx.find_insert_pos(hash);
            idx.insert(pos, IndexEntry { hash, offset }).unwrap();
        }
        let hashes: alloc::vec::Vec<u16> = idx.iter().map(|e| e.hash).collect();
        assert_eq!(hashes, alloc::vec![10, 20, 30]);
    }

    #[test]
    fn insert_pos_is_first_slot_of_a_collision_run() {
        let mut idx = RamIndex::new();
        for (hash, offset) in [(10u16, 0u32), (10, 1), (10, 2)] {
            let pos = idx.find_insert_pos(hash);
            idx.insert(pos, IndexEntry { hash, offset }).unwrap();
        }
        // All three share a hash; insertion always lands at the front of the run.
        assert_eq!(idx.find_insert_pos(10), 0);
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn grows_by_doubling() {
        let mut idx = RamIndex::new();
        for i in 0..INITIAL_CAPACITY {
            idx.insert(
                i,
                IndexEntry {
                    hash: i as u16,
                    offset: 0,
                },
            )
            .unwrap();
        }
        assert_eq!(idx.len(), INITIAL_CAPACITY);
        // One more insert must trigger growth rather than fail.
        idx.insert(
            INITIAL_CAPACITY,
            IndexEntry {
                hash: INITIAL_CAPACITY as u16,
                offset: 0,
            },
        )
        .unwrap();
        assert_eq!(idx.len(), INITIAL_CAPACITY + 1);
    }

    #[test]
    fn remove_shifts_tail_left() {
        let mut idx = RamIndex::new();
        for (hash, offset) in [(1u16, 0u32), (2, 1), (3, 2)] {
            idx.insert(idx.len(), IndexEntry { hash, offset }).unwrap();
        }
        idx.remove(1);
        let hashes: alloc::vec::Vec<u16> = idx.iter().map(|e| e.hash).collect();
        assert_eq!(hashes, alloc::vec![1, 3]);
    }
}
