//! Compactor (GC): copy every live record into the spare area (optionally injecting a pending
//! mutation as part of the copy), write the new anchor as the atomic commit point, then swap the
//! roles of active and spare.

use crate::area;
use crate::bufio::TransactionBuffer;
use crate::device::BlockDevice;
use crate::error::Error;
use crate::index::{IndexEntry, RamIndex};
use crate::readrec::{read_record, DataMode, KeyMode};
use crate::record::{self, MAX_KEY_SIZE};

/// A mutation to fold into the copy instead of (or in addition to) plain reclamation.
pub(crate) enum Pending<'a> {
    None,
    /// Add or update the key at RAM-index position `pos` (`pos == index.len()` for a new key).
    Write {
        pos: usize,
        key: &'a str,
        data: &'a [u8],
        old_record_size: u32,
    },
    /// Remove the entry at `pos`; nothing is written in its place.
    Delete { pos: usize, old_record_size: u32 },
}

pub(crate) struct CompactState<'a> {
    pub index: &'a mut RamIndex,
    pub consumed_size: u32,
    pub active_addr: u32,
    pub spare_addr: u32,
    pub area_size: u32,
    pub active_version: u16,
}

pub(crate) struct CompactOutcome {
    pub active_addr: u32,
    pub spare_addr: u32,
    pub active_version: u16,
    pub consumed_size: u32,
    pub free_space_offset: u32,
}

pub(crate) fn compact<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    state: &mut CompactState<'_>,
    pending: Pending<'_>,
) -> Result<CompactOutcome, Error<D::Error>> {
    if let Pending::Write {
        key,
        data,
        old_record_size,
        ..
    } = &pending
    {
        let program_size = dev.program_size(state.active_addr);
        let new_record_size =
            record::record_size(key.len() as u16, data.len() as u32, program_size);
        if state.consumed_size - old_record_size + new_record_size > state.area_size {
            return Err(Error::StorageFull);
        }
    }

    #[cfg(feature = "defmt")]
    defmt::trace!(
        "compaction start: active={:#08x} spare={:#08x} consumed={}",
        state.active_addr,
        state.spare_addr,
        state.consumed_size
    );

    area::erase_area(dev, state.spare_addr, state.area_size).map_err(Error::Device)?;

    let program_size = dev.program_size(state.spare_addr);
    let anchor_size = record::record_size(record::AREA_ANCHOR_KEY.len() as u16, 4, program_size);
    let mut dst_offset = anchor_size;

    let skip_pos = match &pending {
        Pending::Write { pos, .. } | Pending::Delete { pos, .. } => Some(*pos),
        Pending::None => None,
    };

    let mut key_buf = [0u8; MAX_KEY_SIZE];
    for i in 0..state.index.len() {
        if skip_pos == Some(i) {
            continue;
        }
        let entry = state.index.get(i);
        let outcome = read_record(
            dev,
            tb,
            state.active_addr,
            entry.offset,
            KeyMode::Capture(&mut key_buf),
            DataMode::Skip,
        )?;
        let rec_size = record::record_size(
            outcome.header.key_size,
            outcome.header.data_size,
            program_size,
        );

        tb.buffered_copy(
            dev,
            state.active_addr + entry.offset,
            state.spare_addr + dst_offset,
            rec_size,
        )
        .map_err(Error::Device)?;

        state.index.update(
            i,
            IndexEntry {
                hash: entry.hash,
                offset: dst_offset,
            },
        );
        dst_offset += rec_size;
    }

    match pending {
        Pending::None => {}
        Pending::Write { pos, key, data, .. } => {
            let written_at = dst_offset;
            let rec_size = tb
                .write_record(dev, state.spare_addr + dst_offset, key.as_bytes(), data, false)
                .map_err(Error::Device)?;
            let hash = crate::crc::crc16(key.as_bytes(), crate::crc::INIT);
            if pos < state.index.len() {
                state.index.update(
                    pos,
                    IndexEntry {
                        hash,
                        offset: written_at,
                    },
                );
            } else {
                state
                    .index
                    .insert(
                        pos,
                        IndexEntry {
                            hash,
                            offset: written_at,
                        },
                    )
                    .map_err(|_| Error::MemAlloc)?;
            }
            dst_offset += rec_size;
        }
        Pending::Delete { pos, .. } => {
            state.index.remove(pos);
        }
    }

    let new_version = area::next_version(state.active_version);
    area::write_anchor(dev, tb, state.spare_addr, new_version).map_err(Error::Device)?;

    #[cfg(feature = "defmt")]
    defmt::trace!(
        "compaction end: new active={:#08x} version={} consumed={}",
        state.spare_addr,
        new_version,
        dst_offset
    );

    Ok(CompactOutcome {
        active_addr: state.spare_addr,
        spare_addr: state.active_addr,
        active_version: new_version,
        consumed_size: dst_offset,
        free_space_offset: dst_offset,
    })
}
