//! Mutation engine: `write`/`delete` funnel into one routine parameterized by a tombstone flag,
//! classify the key against the RAM index, and either append in place or hand the mutation to
//! the compactor when the active area has no room left.

use crate::area::Areas;
use crate::bufio::TransactionBuffer;
use crate::compact::{self, CompactState, Pending};
use crate::device::BlockDevice;
use crate::error::Error;
use crate::index::{IndexEntry, RamIndex};
use crate::lookup::lookup;
use crate::record::{self, MAX_KEY_SIZE};

pub(crate) struct MutateOutcome {
    pub areas: Areas,
    pub consumed_size: u32,
    pub free_space_offset: u32,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn mutate<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    areas: Areas,
    index: &mut RamIndex,
    consumed_size: u32,
    free_space_offset: u32,
    key: &str,
    data: &[u8],
    tombstone: bool,
) -> Result<MutateOutcome, Error<D::Error>> {
    if key.is_empty() || key.len() >= MAX_KEY_SIZE || key == record::AREA_ANCHOR_KEY {
        return Err(Error::BadParam);
    }

    let found = lookup(dev, tb, areas.active_addr, index, key)?;

    if tombstone && !found.found {
        return Ok(MutateOutcome {
            areas,
            consumed_size,
            free_space_offset,
        });
    }

    let program_size = dev.program_size(areas.active_addr);
    let data_size = if tombstone { 0 } else { data.len() as u32 };
    let new_record_size = record::record_size(key.len() as u16, data_size, program_size);
    let old_record_size = if found.found {
        record::record_size(key.len() as u16, found.data_size, program_size)
    } else {
        0
    };

    if consumed_size - old_record_size + new_record_size > areas.area_size {
        return Err(Error::StorageFull);
    }

    let needs_compaction =
        free_space_offset as u64 + new_record_size as u64 > areas.area_size as u64;

    if needs_compaction {
        let pending = if tombstone {
            Pending::Delete {
                pos: found.pos,
                old_record_size,
            }
        } else if found.found {
            Pending::Write {
                pos: found.pos,
                key,
                data,
                old_record_size,
            }
        } else {
            Pending::None
        };

        let mut state = CompactState {
            index,
            consumed_size,
            active_addr: areas.active_addr,
            spare_addr: areas.spare_addr,
            area_size: areas.area_size,
            active_version: areas.active_version,
        };
        let outcome = compact::compact(dev, tb, &mut state, pending)?;
        let new_areas = Areas {
            area_size: areas.area_size,
            active_addr: outcome.active_addr,
            spare_addr: outcome.spare_addr,
            active_version: outcome.active_version,
        };

        if !tombstone && !found.found {
            // Compaction only reclaimed space; the add itself still needs to be appended.
            return append(
                dev,
                tb,
                new_areas,
                index,
                outcome.consumed_size,
                outcome.free_space_offset,
                key,
                data,
                found,
            );
        }

        return Ok(MutateOutcome {
            areas: new_areas,
            consumed_size: outcome.consumed_size,
            free_space_offset: outcome.free_space_offset,
        });
    }

    if tombstone {
        let rec_size = tb
            .write_record(
                dev,
                areas.active_addr + free_space_offset,
                key.as_bytes(),
                &[],
                true,
            )
            .map_err(Error::Device)?;
        index.remove(found.pos);
        Ok(MutateOutcome {
            areas,
            consumed_size: consumed_size - old_record_size,
            free_space_offset: free_space_offset + rec_size,
        })
    } else if found.found {
        let rec_size = tb
            .write_record(dev, areas.active_addr + free_space_offset, key.as_bytes(), data, false)
            .map_err(Error::Device)?;
        index.update(
            found.pos,
            IndexEntry {
                hash: found.hash,
                offset: free_space_offset,
            },
        );
        Ok(MutateOutcome {
            areas,
            consumed_size: consumed_size + rec_size - old_record_size,
            free_space_offset: free_space_offset + rec_size,
        })
    } else {
        append(
            dev,
            tb,
            areas,
            index,
            consumed_size,
            free_space_offset,
            key,
            data,
            found,
        )
    }
}

/// Append a brand-new key: reserve RAM-index capacity (failing before any media write if the
/// allocation fails), then write the record and insert the index entry.
#[allow(clippy::too_many_arguments)]
fn append<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    areas: Areas,
    index: &mut RamIndex,
    consumed_size: u32,
    free_space_offset: u32,
    key: &str,
    data: &[u8],
    found: crate::lookup::Lookup,
) -> Result<MutateOutcome, Error<D::Error>> {
    index
        .ensure_capacity_for_one()
        .map_err(|_| Error::MemAlloc)?;

    let rec_size = tb
        .write_record(dev, areas.active_addr + free_space_offset, key.as_bytes(), data, false)
        .map_err(Error::Device)?;
    index
        .insert(
            found.pos,
            IndexEntry {
                hash: found.hash,
                offset: free_space_offset,
            },
        )
        .map_err(|_| Error::MemAlloc)?;

    Ok(MutateOutcome {
        areas,
        consumed_size: consumed_size + rec_size,
        free_space_offset: free_space_offset + rec_size,
    })
}
