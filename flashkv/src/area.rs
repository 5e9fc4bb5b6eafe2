//! Area manager: treat the backing region as two equal areas, each validated by its anchor
//! record (reserved key [`AREA_ANCHOR_KEY`], 4-byte payload `{version: u16, format_version: u16}`),
//! and pick the active area by version with the wraparound rule that `version == 0` beats any
//! non-zero version.

use flash_layout::{FlashLayout, Region};

use crate::bufio::TransactionBuffer;
use crate::device::BlockDevice;
use crate::error::Error;
use crate::readrec::{read_record, DataMode, KeyMode, ReadError};
use crate::record::{self, AREA_ANCHOR_KEY};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Areas {
    pub area_size: u32,
    pub active_addr: u32,
    pub spare_addr: u32,
    pub active_version: u16,
}

/// Check `start_addr`/`length` against the erase-sector alignment and evenness rules of
/// `init()`'s precondition, and return the size of one of the two equal areas.
pub(crate) fn validate_geometry<D: BlockDevice>(
    dev: &D,
    start_addr: u32,
    length: u32,
) -> Result<u32, Error<D::Error>> {
    let erase_size = dev.erase_size(start_addr);
    if erase_size == 0 || start_addr % erase_size != 0 || length % erase_size != 0 {
        return Err(Error::Alignment);
    }

    let sector_count = length / erase_size;
    if sector_count == 0 || sector_count % 2 != 0 {
        return Err(Error::Alignment);
    }

    let area_size = length / 2;
    let regions = [
        Region {
            addr: start_addr as u64,
            eb_bytes: erase_size,
            eb_count: sector_count / 2,
        },
        Region {
            addr: (start_addr as u64) + area_size as u64,
            eb_bytes: erase_size,
            eb_count: sector_count / 2,
        },
    ];
    FlashLayout::try_new(&regions).map_err(|_| Error::Alignment)?;

    Ok(area_size)
}

/// Erase an entire area: non-first sectors first, then the first sector, so a crash mid-erase
/// never leaves a stale but still-valid anchor pointing at a partially erased area.
pub(crate) fn erase_area<D: BlockDevice>(
    dev: &mut D,
    area_addr: u32,
    area_size: u32,
) -> Result<(), D::Error> {
    let erase_size = dev.erase_size(area_addr);
    let first_sector_end = area_addr + erase_size;
    if area_size > erase_size {
        dev.erase(first_sector_end, area_size - erase_size)?;
    }
    dev.erase(area_addr, erase_size)?;
    Ok(())
}

fn encode_anchor_payload(version: u16) -> [u8; 4] {
    let mut buf = [0u8; 4];
    buf[0..2].copy_from_slice(&version.to_le_bytes());
    buf[2..4].copy_from_slice(&(record::FORMAT_VERSION as u16).to_le_bytes());
    buf
}

/// Write a fresh anchor record at the start of `area_addr`, with the given version. Returns the
/// anchor's own padded record size (the scanner's and compactor's starting offset).
pub(crate) fn write_anchor<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area_addr: u32,
    version: u16,
) -> Result<u32, D::Error> {
    let key = AREA_ANCHOR_KEY.as_bytes();
    let payload = encode_anchor_payload(version);
    tb.write_record(dev, area_addr, key, &payload, false)
}

pub(crate) struct AnchorProbe {
    pub version: u16,
}

/// Read and validate the anchor record at the start of `area_addr`. A device error propagates;
/// anything else that makes the anchor untrustworthy (erased, invalid, wrong key) is `Ok(None)`.
pub(crate) fn probe_anchor<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area_addr: u32,
) -> Result<Option<AnchorProbe>, D::Error> {
    let mut payload = [0u8; 4];
    match read_record(
        dev,
        tb,
        area_addr,
        0,
        KeyMode::Validate(AREA_ANCHOR_KEY.as_bytes()),
        DataMode::Copy(&mut payload),
    ) {
        Ok(_) => Ok(Some(AnchorProbe {
            version: u16::from_le_bytes([payload[0], payload[1]]),
        })),
        Err(ReadError::Device(e)) => Err(e),
        Err(ReadError::Erased) | Err(ReadError::Invalid) | Err(ReadError::KeyMismatch) => Ok(None),
    }
}

/// `candidate` is newer than `current` under the wraparound rule (`0` beats any non-zero value).
pub(crate) fn version_is_newer(candidate: u16, current: u16) -> bool {
    if candidate == current {
        return false;
    }
    if candidate == 0 {
        return true;
    }
    if current == 0 {
        return false;
    }
    candidate > current
}

/// The version the compactor should write into the spare area's new anchor.
pub(crate) fn next_version(v: u16) -> u16 {
    v.wrapping_add(1)
}

/// Probe both areas and pick the active one, initializing a fresh store if neither has a valid
/// anchor.
pub(crate) fn select_or_init<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area1_addr: u32,
    area2_addr: u32,
    area_size: u32,
) -> Result<Areas, Error<D::Error>> {
    let probe1 = probe_anchor(dev, tb, area1_addr).map_err(Error::Device)?;
    let probe2 = probe_anchor(dev, tb, area2_addr).map_err(Error::Device)?;

    let areas = match (probe1, probe2) {
        (Some(p1), Some(p2)) if version_is_newer(p2.version, p1.version) => Areas {
            area_size,
            active_addr: area2_addr,
            spare_addr: area1_addr,
            active_version: p2.version,
        },
        (Some(p1), Some(_)) => Areas {
            area_size,
            active_addr: area1_addr,
            spare_addr: area2_addr,
            active_version: p1.version,
        },
        (Some(p1), None) => Areas {
            area_size,
            active_addr: area1_addr,
            spare_addr: area2_addr,
            active_version: p1.version,
        },
        (None, Some(p2)) => Areas {
            area_size,
            active_addr: area2_addr,
            spare_addr: area1_addr,
            active_version: p2.version,
        },
        (None, None) => {
            erase_area(dev, area1_addr, area_size).map_err(Error::Device)?;
            write_anchor(dev, tb, area1_addr, 1).map_err(Error::Device)?;
            Areas {
                area_size,
                active_addr: area1_addr,
                spare_addr: area2_addr,
                active_version: 1,
            }
        }
    };

    #[cfg(feature = "defmt")]
    defmt::trace!(
        "area select: active={:#08x} spare={:#08x} version={}",
        areas.active_addr,
        areas.spare_addr,
        areas.active_version
    );

    Ok(areas)
}
