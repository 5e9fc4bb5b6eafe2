//! The block-device contract: the only boundary between this crate and physical storage.
//!
//! Implementors model a primitive NOR-flash-shaped device: whole-range reads, program operations
//! aligned to a (possibly address-dependent) program granularity, and sector erases aligned to a
//! (possibly address-dependent) erase granularity. The core never mutates the device through any
//! other path and never caches the granularity queries across calls, since a device is permitted
//! (in principle) to answer differently at different addresses.
pub trait BlockDevice {
    /// Error type returned by `read`/`program`/`erase`; propagated to callers unchanged.
    type Error: core::fmt::Debug;

    /// Read `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `buf` at `addr`. Both `addr` and `buf.len()` must be multiples of
    /// `program_size(addr)`.
    fn program(&mut self, addr: u32, buf: &[u8]) -> Result<(), Self::Error>;

    /// Erase `len` bytes starting at `addr`. Both must be multiples of `erase_size(addr)`;
    /// erasure is assumed atomic at sector granularity.
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), Self::Error>;

    /// Minimum contiguous read size at `addr`.
    fn read_size(&self, addr: u32) -> u32;

    /// Program (write) granularity at `addr`.
    fn program_size(&self, addr: u32) -> u32;

    /// Erase-sector granularity at `addr`.
    fn erase_size(&self, addr: u32) -> u32;
}
