//! An in-RAM fake flash device used by unit and integration tests across this crate.
//!
//! Modeled the same way `tickv`'s and `rp2040-tickv`'s own test suites fake out a
//! `FlashController`: a plain byte buffer, erased state all-`0xFF`, uniform granularity.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use crate::device::BlockDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError;

pub struct FakeFlash {
    bytes: Vec<u8>,
    read_size: u32,
    program_size: u32,
    erase_size: u32,
}

impl FakeFlash {
    pub fn new(len: u32, erase_size: u32, program_size: u32, read_size: u32) -> Self {
        Self {
            bytes: vec![0xFFu8; len as usize],
            read_size,
            program_size,
            erase_size,
        }
    }

    /// Flip a single bit on media, for CRC-coverage / corruption-recovery tests.
    pub fn flip_bit(&mut self, addr: u32, bit: u8) {
        self.bytes[addr as usize] ^= 1 << bit;
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }
}

impl BlockDevice for FakeFlash {
    type Error = DeviceError;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        let addr = addr as usize;
        buf.copy_from_slice(&self.bytes[addr..addr + buf.len()]);
        Ok(())
    }

    fn program(&mut self, addr: u32, buf: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(addr % self.program_size, 0, "unaligned program address");
        assert_eq!(buf.len() as u32 % self.program_size, 0, "unaligned program length");
        let addr = addr as usize;
        self.bytes[addr..addr + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), Self::Error> {
        assert_eq!(addr % self.erase_size, 0, "unaligned erase address");
        assert_eq!(len % self.erase_size, 0, "unaligned erase length");
        let addr = addr as usize;
        for b in &mut self.bytes[addr..addr + len as usize] {
            *b = 0xFF;
        }
        Ok(())
    }

    fn read_size(&self, _addr: u32) -> u32 {
        self.read_size
    }

    fn program_size(&self, _addr: u32) -> u32 {
        self.program_size
    }

    fn erase_size(&self, _addr: u32) -> u32 {
        self.erase_size
    }
}
