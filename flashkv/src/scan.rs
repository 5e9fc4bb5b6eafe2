//! Scanner / recovery: after the area manager has chosen the active area, walk it from the
//! anchor onward, rebuilding the RAM index and the consumed/free-space counters from scratch, as
//! if every record were replayed in append order.

use crate::area;
use crate::bufio::TransactionBuffer;
use crate::device::BlockDevice;
use crate::error::Error;
use crate::index::{IndexEntry, RamIndex};
use crate::lookup::lookup;
use crate::readrec::{read_record, DataMode, KeyMode, ReadError};
use crate::record::{self, RecordHeader, HEADER_SIZE, MAX_KEY_SIZE};

pub(crate) struct ScanOutcome {
    pub index: RamIndex,
    pub consumed_size: u32,
    pub free_space_offset: u32,
    /// Set when the scan hit an invalid (non-erased) record. The caller must run corruption
    /// recovery (compaction with no pending mutation) before the store is usable; everything up
    /// to but excluding the bad record is already reflected in `index`/`consumed_size`.
    pub needs_recovery: bool,
}

pub(crate) fn scan_active<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area_addr: u32,
    area_size: u32,
) -> Result<ScanOutcome, Error<D::Error>> {
    let program_size = dev.program_size(area_addr);
    let anchor_size = record::record_size(record::AREA_ANCHOR_KEY.len() as u16, 4, program_size);

    let mut index = RamIndex::new();
    let mut consumed_size = anchor_size;
    let mut offset = anchor_size;
    let mut needs_recovery = false;
    let mut key_buf = [0u8; MAX_KEY_SIZE];

    loop {
        if (offset as u64) + (HEADER_SIZE as u64) >= area_size as u64 {
            break;
        }

        let outcome = match read_record(
            dev,
            tb,
            area_addr,
            offset,
            KeyMode::Capture(&mut key_buf),
            DataMode::Skip,
        ) {
            Ok(o) => o,
            Err(ReadError::Erased) => break,
            Err(ReadError::Invalid) => {
                needs_recovery = true;
                break;
            }
            Err(ReadError::KeyMismatch) => unreachable!("capture mode never reports a mismatch"),
            Err(ReadError::Device(e)) => return Err(Error::Device(e)),
        };

        let header = outcome.header;
        let key_size = header.key_size as usize;
        let rec_size = record::record_size(header.key_size, header.data_size, program_size);
        let key = core::str::from_utf8(&key_buf[..key_size]).map_err(|_| Error::InvalidData)?;

        if key != record::AREA_ANCHOR_KEY {
            apply_scanned_record(
                dev,
                tb,
                area_addr,
                &mut index,
                &mut consumed_size,
                key,
                &header,
                offset,
                rec_size,
                program_size,
            )?;
        }

        offset += rec_size;
    }

    Ok(ScanOutcome {
        index,
        consumed_size,
        free_space_offset: offset,
        needs_recovery,
    })
}

/// Classify one scanned record against the index built so far and fold it in: add, update,
/// delete, or (tombstone for a key not currently indexed) ignore.
#[allow(clippy::too_many_arguments)]
fn apply_scanned_record<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area_addr: u32,
    index: &mut RamIndex,
    consumed_size: &mut u32,
    key: &str,
    header: &RecordHeader,
    offset: u32,
    rec_size: u32,
    program_size: u32,
) -> Result<(), Error<D::Error>> {
    let found = lookup(dev, tb, area_addr, index, key)?;

    match (header.is_tombstone(), found.found) {
        (true, false) => {}
        (true, true) => {
            let old_size = record::record_size(key.len() as u16, found.data_size, program_size);
            index.remove(found.pos);
            *consumed_size -= old_size;
        }
        (false, false) => {
            index
                .insert(
                    found.pos,
                    IndexEntry {
                        hash: found.hash,
                        offset,
                    },
                )
                .map_err(|_| Error::MemAlloc)?;
            *consumed_size += rec_size;
        }
        (false, true) => {
            let old_size = record::record_size(key.len() as u16, found.data_size, program_size);
            index.update(
                found.pos,
                IndexEntry {
                    hash: found.hash,
                    offset,
                },
            );
            *consumed_size = *consumed_size + rec_size - old_size;
        }
    }

    Ok(())
}
