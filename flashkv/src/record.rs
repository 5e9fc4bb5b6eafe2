//! On-media record layout: header, then key bytes, then payload bytes, padded up to the
//! destination address's program granularity.
//!
//! Every integer field is little-endian on the wire. The header byte layout is:
//!
//! ```text
//! offset  size  field
//! 0       4     magic            (0xFACEFACE)
//! 4       1     format_version
//! 5       1     flags            (bit 7 = tombstone)
//! 6       2     header_size      (HEADER_SIZE, recorded for forward compatibility)
//! 8       2     key_size
//! 10      4     data_size
//! 14      4     crc              (low 16 bits meaningful, high 16 bits always 0)
//! ```
//!
//! The `crc` field is declared 32 bits wide on the wire even though only 16 bits of it are ever
//! computed or compared (an open question resolved in favor of zero-extending the stored CRC and
//! always writing the upper half as zero, so the header-minus-crc CRC coverage stays
//! deterministic regardless of what a prior version happened to leave there).

use crate::crc::{self, Crc16};

/// Magic value marking the start of a valid record.
pub const MAGIC: u32 = 0xFACE_FACE;

/// Current on-media record layout version.
pub const FORMAT_VERSION: u8 = 0;

/// Maximum permitted key length in bytes (`0 < key_size < MAX_KEY_SIZE`).
pub const MAX_KEY_SIZE: usize = 64;

/// Reserved key identifying the first record of an area (the anchor).
pub const AREA_ANCHOR_KEY: &str = "MTBAREAIDX";

bitflags::bitflags! {
    pub struct RecordFlags: u8 {
        const TOMBSTONE = 0b1000_0000;
    }
}

/// Size, in bytes, of the fixed-layout record header.
pub const HEADER_SIZE: usize = 4 + 1 + 1 + 2 + 2 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub format_version: u8,
    pub flags: RecordFlags,
    pub key_size: u16,
    pub data_size: u32,
    pub crc: u32,
}

/// Result of attempting to decode a header read from media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Valid(RecordHeader),
    /// `magic` read back as all-0x00 or all-0xFF: past the end of written data, not corruption.
    Erased,
    /// Any other violation: bad magic, or a key size of 0 or `>= MAX_KEY_SIZE`.
    Invalid,
}

/// Round `val` up to the next multiple of `align` (`align` must be a power of two, as all flash
/// program/erase granularities are).
pub fn align_up(val: u32, align: u32) -> u32 {
    debug_assert!(align > 0);
    ((val + align - 1) / align) * align
}

/// Padded on-media size of a record with the given key/payload lengths, at a destination whose
/// program granularity is `program_size`.
pub fn record_size(key_size: u16, data_size: u32, program_size: u32) -> u32 {
    align_up(HEADER_SIZE as u32 + key_size as u32 + data_size, program_size)
}

impl RecordHeader {
    pub fn new(key_size: u16, data_size: u32, tombstone: bool) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            flags: if tombstone {
                RecordFlags::TOMBSTONE
            } else {
                RecordFlags::empty()
            },
            key_size,
            data_size,
            crc: 0,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags.contains(RecordFlags::TOMBSTONE)
    }

    /// Serialize the header, with `crc` already computed, into `out`.
    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4] = self.format_version;
        out[5] = self.flags.bits();
        out[6..8].copy_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
        out[8..10].copy_from_slice(&self.key_size.to_le_bytes());
        out[10..14].copy_from_slice(&self.data_size.to_le_bytes());
        out[14..18].copy_from_slice(&self.crc.to_le_bytes());
    }

    /// Decode a header previously read from media.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> DecodeOutcome {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic == 0x0000_0000 || magic == 0xFFFF_FFFF {
            return DecodeOutcome::Erased;
        }
        if magic != MAGIC {
            return DecodeOutcome::Invalid;
        }

        let key_size = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
        if key_size == 0 || key_size as usize >= MAX_KEY_SIZE {
            return DecodeOutcome::Invalid;
        }

        let format_version = bytes[4];
        let flags = RecordFlags::from_bits_truncate(bytes[5]);
        let data_size = u32::from_le_bytes(bytes[10..14].try_into().unwrap());
        let crc = u32::from_le_bytes(bytes[14..18].try_into().unwrap());

        DecodeOutcome::Valid(RecordHeader {
            format_version,
            flags,
            key_size,
            data_size,
            crc,
        })
    }

    /// CRC over every header byte except the `crc` field itself, chained from `init`.
    pub fn header_crc(&self, init: u16) -> u16 {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode(&mut buf);
        Crc16::with_init(init).update(&buf[..14]).finish()
    }
}

/// Full record CRC: header-excluding-crc, then key, then payload.
pub fn record_crc(header: &RecordHeader, key: &[u8], data: &[u8]) -> u16 {
    let h = header.header_crc(crc::INIT);
    let h = crc::crc16(key, h);
    crc::crc16(data, h)
}

/// The stored CRC is zero-extended `u32`; only the low 16 bits are ever meaningful.
pub fn crc_matches(header: &RecordHeader, computed: u16) -> bool {
    (header.crc & 0xffff) as u16 == computed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_program_size() {
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(0, 8), 0);
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut header = RecordHeader::new(5, 3, false);
        header.crc = record_crc(&header, b"alpha", &[1, 2, 3]) as u32;

        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);

        match RecordHeader::decode(&buf) {
            DecodeOutcome::Valid(decoded) => {
                assert_eq!(decoded.key_size, 5);
                assert_eq!(decoded.data_size, 3);
                assert!(!decoded.is_tombstone());
                assert!(crc_matches(
                    &decoded,
                    record_crc(&decoded, b"alpha", &[1, 2, 3])
                ));
            }
            other => panic!("expected a valid record, got {:?}", other),
        }
    }

    #[test]
    fn erased_magic_is_distinguished_from_invalid() {
        let mut zeros = [0u8; HEADER_SIZE];
        assert_eq!(RecordHeader::decode(&zeros), DecodeOutcome::Erased);

        let ones = [0xFFu8; HEADER_SIZE];
        assert_eq!(RecordHeader::decode(&ones), DecodeOutcome::Erased);

        zeros[0] = 0xAB;
        assert_eq!(RecordHeader::decode(&zeros), DecodeOutcome::Invalid);
    }

    #[test]
    fn rejects_out_of_range_key_size() {
        let mut header = RecordHeader::new(1, 0, false);
        header.key_size = 0;
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);
        assert_eq!(RecordHeader::decode(&buf), DecodeOutcome::Invalid);

        header.key_size = MAX_KEY_SIZE as u16;
        header.encode(&mut buf);
        assert_eq!(RecordHeader::decode(&buf), DecodeOutcome::Invalid);
    }

    #[test]
    fn bit_flip_fails_crc_check() {
        let mut header = RecordHeader::new(5, 3, false);
        header.crc = record_crc(&header, b"alpha", &[1, 2, 3]) as u32;
        let computed = record_crc(&header, b"alphb", &[1, 2, 3]);
        assert!(!crc_matches(&header, computed));
    }
}
