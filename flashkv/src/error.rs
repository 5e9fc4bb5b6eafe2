//! Error taxonomy shared by every public operation.
//!
//! `E` is the error type of the caller-supplied [`crate::device::BlockDevice`]; device errors are
//! propagated verbatim rather than folded into a generic "I/O failed" variant, so callers can
//! still match on the underlying cause.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A null/empty/oversized key, or a `data`/`size` mismatch, was supplied.
    BadParam,
    /// `start_addr`/`length` are not aligned to the erase sector, or the region does not span
    /// an even, non-zero number of erase sectors.
    Alignment,
    /// A heap allocation (transaction buffer or RAM index growth) failed.
    MemAlloc,
    /// A record's CRC did not match, its magic was neither valid nor erased, or it reported an
    /// out-of-range key size.
    InvalidData,
    /// The key is not present in the RAM index (or a hash match's stored key differs).
    ItemNotFound,
    /// Live data would not fit the area even after compaction.
    StorageFull,
    /// The instance lock could not be acquired within its timeout.
    LockTimeout,
    /// Propagated unchanged from the block device.
    Device(E),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadParam => write!(f, "invalid argument"),
            Error::Alignment => write!(f, "region is not aligned to the erase sector boundary"),
            Error::MemAlloc => write!(f, "heap allocation failed"),
            Error::InvalidData => write!(f, "record failed CRC or magic validation"),
            Error::ItemNotFound => write!(f, "key not found"),
            Error::StorageFull => write!(f, "live data does not fit the area"),
            Error::LockTimeout => write!(f, "timed out acquiring the store lock"),
            Error::Device(e) => write!(f, "block device error: {:?}", e),
        }
    }
}

/// `read_record`'s internal result (where "erased"/"key mismatch" are meaningful control flow,
/// not failures) collapses to this taxonomy once it escapes to a public-facing call: erasure,
/// corruption and key mismatches are all reported as [`Error::InvalidData`] or
/// [`Error::ItemNotFound`] by the call site, never as a distinct variant here.
impl<E> From<crate::readrec::ReadError<E>> for Error<E> {
    fn from(e: crate::readrec::ReadError<E>) -> Self {
        match e {
            crate::readrec::ReadError::Device(e) => Error::Device(e),
            crate::readrec::ReadError::Erased
            | crate::readrec::ReadError::Invalid
            | crate::readrec::ReadError::KeyMismatch => Error::InvalidData,
        }
    }
}
