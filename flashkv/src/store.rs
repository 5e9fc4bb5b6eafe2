//! The public key-value store: owns the block device, RAM index and transaction buffer, and
//! serializes every operation through an instance lock.

use crate::area::{self, Areas};
use crate::bufio::{TransactionBuffer, MIN_BUFFER_SIZE};
use crate::compact::{self, CompactState, Pending};
use crate::device::BlockDevice;
use crate::error::Error;
use crate::index::RamIndex;
use crate::lock::{NoopLock, RawLock, DEFAULT_TIMEOUT_MS};
use crate::lookup::lookup;
use crate::mutate;
use crate::readrec::{self, DataMode, KeyMode};
use crate::record;

/// A crash-safe key-value store over a raw, sector-erasable block device.
///
/// `L` is the mutual-exclusion primitive serializing access to a single instance; it defaults to
/// [`NoopLock`] for targets with no RTOS and a single thread of access.
pub struct Store<D: BlockDevice, L: RawLock = NoopLock> {
    device: D,
    lock: L,
    /// `None` only after `Drop::drop` has torn the store down under the lock.
    tb: Option<TransactionBuffer>,
    /// `None` only after `Drop::drop` has torn the store down under the lock.
    index: Option<RamIndex>,
    areas: Areas,
    consumed_size: u32,
    free_space_offset: u32,
    timeout_ms: u32,
}

impl<D: BlockDevice> Store<D, NoopLock> {
    /// Initialize a store without an RTOS lock (callers must serialize access externally).
    pub fn init(start_addr: u32, length: u32, device: D) -> Result<Self, Error<D::Error>> {
        Self::init_with_lock(start_addr, length, device, NoopLock)
    }
}

impl<D: BlockDevice, L: RawLock> Store<D, L> {
    /// Initialize a store with an explicit lock implementation.
    pub fn init_with_lock(
        start_addr: u32,
        length: u32,
        mut device: D,
        lock: L,
    ) -> Result<Self, Error<D::Error>> {
        let area_size = area::validate_geometry(&device, start_addr, length)?;

        let program_size = device.program_size(start_addr);
        let read_size = device.read_size(start_addr);
        let buf_size = record::align_up(
            core::cmp::max(MIN_BUFFER_SIZE as u32, core::cmp::max(program_size, read_size)),
            program_size,
        ) as usize;
        let mut tb = TransactionBuffer::try_new(buf_size).map_err(|_| Error::MemAlloc)?;

        let area1_addr = start_addr;
        let area2_addr = start_addr + area_size;
        let mut areas =
            area::select_or_init(&mut device, &mut tb, area1_addr, area2_addr, area_size)?;

        let scan_outcome = scan_and_recover(&mut device, &mut tb, &mut areas)?;

        Ok(Self {
            device,
            lock,
            tb: Some(tb),
            index: Some(scan_outcome.0),
            areas,
            consumed_size: scan_outcome.1,
            free_space_offset: scan_outcome.2,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        })
    }

    /// Add or overwrite `key`'s value. `data` may be empty.
    pub fn write(&mut self, key: &str, data: &[u8]) -> Result<(), Error<D::Error>> {
        self.lock
            .with_lock(self.timeout_ms, || {
                let outcome = mutate::mutate(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    self.areas,
                    self.index.as_mut().unwrap(),
                    self.consumed_size,
                    self.free_space_offset,
                    key,
                    data,
                    false,
                )?;
                self.areas = outcome.areas;
                self.consumed_size = outcome.consumed_size;
                self.free_space_offset = outcome.free_space_offset;
                Ok(())
            })
            .unwrap_or(Err(Error::LockTimeout))
    }

    /// Remove `key`. Idempotent: deleting an absent key succeeds as a no-op.
    pub fn delete(&mut self, key: &str) -> Result<(), Error<D::Error>> {
        self.lock
            .with_lock(self.timeout_ms, || {
                let outcome = mutate::mutate(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    self.areas,
                    self.index.as_mut().unwrap(),
                    self.consumed_size,
                    self.free_space_offset,
                    key,
                    &[],
                    true,
                )?;
                self.areas = outcome.areas;
                self.consumed_size = outcome.consumed_size;
                self.free_space_offset = outcome.free_space_offset;
                Ok(())
            })
            .unwrap_or(Err(Error::LockTimeout))
    }

    /// Key-existence probe: does not touch media beyond what's needed to validate a hash match.
    pub fn contains_key(&mut self, key: &str) -> Result<bool, Error<D::Error>> {
        self.lock
            .with_lock(self.timeout_ms, || {
                let found = lookup(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    self.areas.active_addr,
                    self.index.as_ref().unwrap(),
                    key,
                )?;
                Ok(found.found)
            })
            .unwrap_or(Err(Error::LockTimeout))
    }

    /// Size of `key`'s stored value, for callers that want to pre-size a read buffer.
    pub fn value_len(&mut self, key: &str) -> Result<u32, Error<D::Error>> {
        self.lock
            .with_lock(self.timeout_ms, || {
                let found = lookup(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    self.areas.active_addr,
                    self.index.as_ref().unwrap(),
                    key,
                )?;
                if !found.found {
                    return Err(Error::ItemNotFound);
                }
                Ok(found.data_size)
            })
            .unwrap_or(Err(Error::LockTimeout))
    }

    /// Read `key`'s value into `buf`, returning the number of bytes written. `buf` must be at
    /// least as large as the stored value (use [`Self::value_len`] to pre-size it).
    pub fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<u32, Error<D::Error>> {
        self.lock
            .with_lock(self.timeout_ms, || {
                let found = lookup(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    self.areas.active_addr,
                    self.index.as_ref().unwrap(),
                    key,
                )?;
                if !found.found {
                    return Err(Error::ItemNotFound);
                }
                if (buf.len() as u32) < found.data_size {
                    return Err(Error::BadParam);
                }
                let offset = self.index.as_ref().unwrap().get(found.pos).offset;
                let outcome = readrec::read_record(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    self.areas.active_addr,
                    offset,
                    KeyMode::Validate(key.as_bytes()),
                    DataMode::Copy(&mut buf[..found.data_size as usize]),
                )?;
                Ok(outcome.header.data_size)
            })
            .unwrap_or(Err(Error::LockTimeout))
    }

    /// Wipe every key. Leaves a freshly compacted active area with only the anchor record.
    pub fn reset(&mut self) -> Result<(), Error<D::Error>> {
        self.lock
            .with_lock(self.timeout_ms, || {
                self.index.as_mut().unwrap().clear();
                let mut state = CompactState {
                    index: self.index.as_mut().unwrap(),
                    consumed_size: self.consumed_size,
                    active_addr: self.areas.active_addr,
                    spare_addr: self.areas.spare_addr,
                    area_size: self.areas.area_size,
                    active_version: self.areas.active_version,
                };
                let outcome = compact::compact(
                    &mut self.device,
                    self.tb.as_mut().unwrap(),
                    &mut state,
                    Pending::None,
                )?;
                self.areas = Areas {
                    area_size: self.areas.area_size,
                    active_addr: outcome.active_addr,
                    spare_addr: outcome.spare_addr,
                    active_version: outcome.active_version,
                };
                self.consumed_size = outcome.free_space_offset;
                self.free_space_offset = outcome.free_space_offset;
                Ok(())
            })
            .unwrap_or(Err(Error::LockTimeout))
    }

    /// Total padded bytes of live records plus the anchor in the active area.
    pub fn size(&self) -> u32 {
        self.consumed_size
    }

    /// Bytes of the active area not accounted for by live records or the anchor.
    pub fn remaining_size(&self) -> u32 {
        self.areas.area_size - self.consumed_size
    }
}

impl<D: BlockDevice, L: RawLock> Drop for Store<D, L> {
    fn drop(&mut self) {
        let tb = &mut self.tb;
        let index = &mut self.index;
        self.lock.with_lock_forever(|| {
            // Free the transaction buffer and RAM index under the lock, matching deinit()'s
            // contract, rather than relying on the compiler-generated field drops that would
            // otherwise run after `with_lock_forever` has already released it.
            tb.take();
            index.take();
        });
    }
}

/// Scan the active area, then, if the scanner hit corruption, run recovery-by-compaction before
/// the store is usable.
fn scan_and_recover<D: BlockDevice>(
    device: &mut D,
    tb: &mut TransactionBuffer,
    areas: &mut Areas,
) -> Result<(RamIndex, u32, u32), Error<D::Error>> {
    let outcome = crate::scan::scan_active(device, tb, areas.active_addr, areas.area_size)?;
    let mut index = outcome.index;
    let mut consumed_size = outcome.consumed_size;
    let mut free_space_offset = outcome.free_space_offset;

    if outcome.needs_recovery {
        #[cfg(feature = "defmt")]
        defmt::trace!(
            "scan hit corruption at offset {}, recovering by compaction",
            free_space_offset
        );

        let mut state = CompactState {
            index: &mut index,
            consumed_size,
            active_addr: areas.active_addr,
            spare_addr: areas.spare_addr,
            area_size: areas.area_size,
            active_version: areas.active_version,
        };
        let compacted = compact::compact(device, tb, &mut state, Pending::None)?;
        *areas = Areas {
            area_size: areas.area_size,
            active_addr: compacted.active_addr,
            spare_addr: compacted.spare_addr,
            active_version: compacted.active_version,
        };
        consumed_size = compacted.consumed_size;
        free_space_offset = compacted.free_space_offset;
    }

    Ok((index, consumed_size, free_space_offset))
}
