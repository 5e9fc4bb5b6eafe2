//! The single record-reading routine shared by area probing, index lookups and scanning: read
//! the header, resolve the key (either validating it against a caller-supplied key, or copying
//! the on-media key out for a caller that doesn't know it yet), optionally copy the payload, and
//! fold everything into a running CRC to decide whether the record is trustworthy.

use crate::bufio::TransactionBuffer;
use crate::crc::{self, Crc16};
use crate::device::BlockDevice;
use crate::record::{self, DecodeOutcome, RecordHeader, HEADER_SIZE};

#[derive(Debug)]
pub(crate) enum ReadError<E> {
    Device(E),
    /// Read past the end of written data (all-0x00 or all-0xFF magic).
    Erased,
    /// Bad magic, out-of-range key size, CRC mismatch, or payload buffer too small.
    Invalid,
    /// Only returned when resolving a caller-supplied key: the on-media key differs.
    KeyMismatch,
}

impl<E> From<E> for ReadError<E> {
    fn from(e: E) -> Self {
        ReadError::Device(e)
    }
}

pub(crate) struct ReadOutcome {
    pub header: RecordHeader,
}

pub(crate) enum KeyMode<'a> {
    /// Compare the on-media key against this exact byte string.
    Validate(&'a [u8]),
    /// The caller doesn't know the key yet; copy it into this buffer (which must be at least
    /// `MAX_KEY_SIZE` bytes).
    Capture(&'a mut [u8]),
}

pub(crate) enum DataMode<'a> {
    /// Stream the payload through the CRC without returning it.
    Skip,
    /// Copy the payload into this buffer; too small a buffer is reported as `Invalid`.
    Copy(&'a mut [u8]),
}

/// Read and validate the record at `area_addr + offset`.
pub(crate) fn read_record<D: BlockDevice>(
    dev: &mut D,
    tb: &mut TransactionBuffer,
    area_addr: u32,
    offset: u32,
    key_mode: KeyMode<'_>,
    data_mode: DataMode<'_>,
) -> Result<ReadOutcome, ReadError<D::Error>> {
    let record_addr = area_addr + offset;

    let mut header_bytes = [0u8; HEADER_SIZE];
    dev.read(record_addr, &mut header_bytes)?;

    let header = match RecordHeader::decode(&header_bytes) {
        DecodeOutcome::Erased => return Err(ReadError::Erased),
        DecodeOutcome::Invalid => return Err(ReadError::Invalid),
        DecodeOutcome::Valid(h) => h,
    };

    if let DataMode::Copy(buf) = &data_mode {
        if (buf.len() as u32) < header.data_size {
            return Err(ReadError::Invalid);
        }
    }

    let mut crc = Crc16::with_init(header.header_crc(crc::INIT));

    let key_addr = record_addr + HEADER_SIZE as u32;
    match key_mode {
        KeyMode::Validate(expected) => {
            if expected.len() != header.key_size as usize {
                return Err(ReadError::KeyMismatch);
            }
            if !tb.buffered_compare(dev, key_addr, expected)? {
                return Err(ReadError::KeyMismatch);
            }
            crc.update(expected);
        }
        KeyMode::Capture(buf) => {
            let key_size = header.key_size as usize;
            dev.read(key_addr, &mut buf[..key_size])?;
            crc.update(&buf[..key_size]);
        }
    }

    let data_addr = key_addr + header.key_size as u32;
    match data_mode {
        DataMode::Skip => {
            tb.buffered_crc(dev, data_addr, header.data_size, &mut crc)?;
        }
        DataMode::Copy(buf) => {
            let data_size = header.data_size as usize;
            dev.read(data_addr, &mut buf[..data_size])?;
            crc.update(&buf[..data_size]);
        }
    }

    if !record::crc_matches(&header, crc.finish()) {
        return Err(ReadError::Invalid);
    }

    Ok(ReadOutcome { header })
}
