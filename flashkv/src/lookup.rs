//! Resolve a key against the RAM index: find the hash's collision run, and verify each candidate
//! against media until a key match, a hash mismatch past the run, or the end of the table.

use crate::bufio::TransactionBuffer;
use crate::crc;
use crate::device::BlockDevice;
use crate::error::Error;
use crate::index::RamIndex;
use crate::readrec::{read_record, DataMode, KeyMode, ReadError};

pub(crate) struct Lookup {
    /// Position in the index: the matching entry if `found`, otherwise the correct insertion
    /// point for a new entry with this hash.
    pub pos: usize,
    pub hash: u16,
    pub found: bool,
    /// Payload size of the matching entry's record; `0` if not found.
    pub data_size: u32,
}

pub(crate) fn lookup<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area_addr: u32,
    index: &RamIndex,
    key: &str,
) -> Result<Lookup, Error<D::Error>> {
    let hash = crc::crc16(key.as_bytes(), crc::INIT);
    let mut pos = index.find_insert_pos(hash);

    while pos < index.len() && index.get(pos).hash == hash {
        let entry = index.get(pos);
        match read_record(
            dev,
            tb,
            area_addr,
            entry.offset,
            KeyMode::Validate(key.as_bytes()),
            DataMode::Skip,
        ) {
            Ok(outcome) => {
                return Ok(Lookup {
                    pos,
                    hash,
                    found: true,
                    data_size: outcome.header.data_size,
                })
            }
            Err(ReadError::KeyMismatch) => {
                pos += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Lookup {
        pos,
        hash,
        found: false,
        data_size: 0,
    })
}
