//! Buffered I/O: a single transaction buffer through which every small write is aggregated into
//! program-granularity-aligned bursts, and through which CRC reads and record copies are
//! streamed without ever materializing a whole record in RAM.

extern crate alloc;
use alloc::vec::Vec;

use crate::crc::Crc16;
use crate::device::BlockDevice;
use crate::record;

/// Minimum transaction buffer size, regardless of device granularity.
pub const MIN_BUFFER_SIZE: usize = 128;

pub(crate) struct TransactionBuffer {
    buf: Vec<u8>,
}

impl TransactionBuffer {
    /// Allocate a buffer of exactly `size` bytes. `size` must already be a multiple of every
    /// program size this buffer will ever be flushed at.
    pub fn try_new(size: usize) -> Result<Self, ()> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| ())?;
        buf.resize(size, 0);
        Ok(Self { buf })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Stream `len` bytes starting at `addr` through the buffer, folding each chunk into `crc`.
    pub fn buffered_crc<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        mut addr: u32,
        mut len: u32,
        crc: &mut Crc16,
    ) -> Result<(), D::Error> {
        while len > 0 {
            let chunk = core::cmp::min(self.buf.len() as u32, len) as usize;
            dev.read(addr, &mut self.buf[..chunk])?;
            crc.update(&self.buf[..chunk]);
            addr += chunk as u32;
            len -= chunk as u32;
        }
        Ok(())
    }

    /// Stream `expected.len()` bytes from `addr` through the buffer, short-circuiting as soon as
    /// a mismatching chunk is found. Used to validate an on-media key against a caller-supplied
    /// one without ever materializing the whole key outside the transaction buffer.
    pub fn buffered_compare<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        mut addr: u32,
        expected: &[u8],
    ) -> Result<bool, D::Error> {
        let mut remaining = expected;
        while !remaining.is_empty() {
            let chunk = core::cmp::min(self.buf.len(), remaining.len());
            dev.read(addr, &mut self.buf[..chunk])?;
            if self.buf[..chunk] != remaining[..chunk] {
                return Ok(false);
            }
            addr += chunk as u32;
            remaining = &remaining[chunk..];
        }
        Ok(true)
    }

    /// Stream-copy `len` bytes from `src` to `dst` through the buffer (used by the compactor to
    /// relocate a live record without materializing it whole).
    pub fn buffered_copy<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        mut src: u32,
        mut dst: u32,
        mut len: u32,
    ) -> Result<(), D::Error> {
        while len > 0 {
            let chunk = core::cmp::min(self.buf.len() as u32, len) as usize;
            dev.read(src, &mut self.buf[..chunk])?;
            dev.program(dst, &self.buf[..chunk])?;
            src += chunk as u32;
            dst += chunk as u32;
            len -= chunk as u32;
        }
        Ok(())
    }

    /// Encode a full record (header, key, payload) and write it starting at `addr`, returning its
    /// padded on-media size. Used by the area manager (anchor writes), the mutation engine
    /// (appends) and the compactor (injecting a pending mutation).
    pub fn write_record<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        addr: u32,
        key: &[u8],
        data: &[u8],
        tombstone: bool,
    ) -> Result<u32, D::Error> {
        let mut header = record::RecordHeader::new(key.len() as u16, data.len() as u32, tombstone);
        header.crc = record::record_crc(&header, key, data) as u32;

        let mut header_bytes = [0u8; record::HEADER_SIZE];
        header.encode(&mut header_bytes);

        let program_size = dev.program_size(addr);
        let mut write_addr = addr;
        let mut space_left = self.len();
        self.buffered_write(dev, &header_bytes, &mut write_addr, &mut space_left, false)?;
        self.buffered_write(dev, key, &mut write_addr, &mut space_left, false)?;
        self.buffered_write(dev, data, &mut write_addr, &mut space_left, true)?;

        Ok(record::record_size(
            key.len() as u16,
            data.len() as u32,
            program_size,
        ))
    }

    /// Append `data` into the buffer, flushing a whole-buffer-sized program each time it fills.
    /// `write_addr` and `space_left` are threaded through successive calls for the same record
    /// (header, then key, then payload); pass `flush = true` on the last call to pad the tail up
    /// to the destination's program size and program the partial buffer.
    pub fn buffered_write<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        data: &[u8],
        write_addr: &mut u32,
        space_left: &mut usize,
        flush: bool,
    ) -> Result<(), D::Error> {
        let mut offset = self.buf.len() - *space_left;
        let mut remaining = data;
        while !remaining.is_empty() {
            let take = core::cmp::min(*space_left, remaining.len());
            self.buf[offset..offset + take].copy_from_slice(&remaining[..take]);
            *space_left -= take;
            offset += take;
            remaining = &remaining[take..];
            if *space_left == 0 {
                dev.program(*write_addr, &self.buf)?;
                *space_left = self.buf.len();
                offset = 0;
                *write_addr += self.buf.len() as u32;
            }
        }

        if flush && *space_left != self.buf.len() {
            let used = self.buf.len() - *space_left;
            let prog_size = dev.program_size(*write_addr);
            let padded = record::align_up(used as u32, prog_size) as usize;
            dev.program(*write_addr, &self.buf[..padded])?;
            *space_left = self.buf.len();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeFlash;

    #[test]
    fn buffered_write_flushes_full_bursts_then_pads_tail() {
        let mut dev = FakeFlash::new(4096, 4096, 8, 8);
        let mut tb = TransactionBuffer::try_new(16).unwrap();
        let mut addr = 0u32;
        let mut space_left = tb.len();

        tb.buffered_write(&mut dev, &[1; 20], &mut addr, &mut space_left, false)
            .unwrap();
        // 16 bytes flushed as one burst, 4 bytes buffered.
        assert_eq!(addr, 16);
        assert_eq!(space_left, 12);

        tb.buffered_write(&mut dev, &[2; 3], &mut addr, &mut space_left, true)
            .unwrap();
        // 7 buffered bytes flushed, padded up to the 8-byte program size.
        assert_eq!(space_left, tb.len());

        let mut out = [0u8; 16];
        dev.read(0, &mut out).unwrap();
        assert_eq!(&out[0..16], &[1; 16]);
        let mut tail = [0u8; 8];
        dev.read(16, &mut tail).unwrap();
        assert_eq!(&tail[0..4], &[1, 1, 1, 1]);
        assert_eq!(&tail[4..7], &[2, 2, 2]);
    }

    #[test]
    fn buffered_crc_matches_one_shot_over_same_bytes() {
        let mut dev = FakeFlash::new(4096, 4096, 8, 1);
        dev.program(0, &[5; 40]).unwrap();
        let mut tb = TransactionBuffer::try_new(8).unwrap();
        let mut crc = Crc16::new();
        tb.buffered_crc(&mut dev, 0, 40, &mut crc).unwrap();
        assert_eq!(crc.finish(), crate::crc::crc16(&[5; 40], crate::crc::INIT));
    }
}
