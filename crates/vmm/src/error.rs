//! Errors reported by the virtual memory manager.

use core::fmt;

use crate::{FrameNumber, PageNumber, VirtualAddress};

/// Errors that can occur while translating or accessing a virtual address.
///
/// None of these are transient: each one means a translation attempt cannot
/// proceed, and retrying the same request will fail the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuError {
    /// The configuration constants do not describe a usable table layout.
    InvalidGeometry(&'static str),
    /// The virtual address lies outside the virtual address space.
    AddressOutOfRange {
        address: VirtualAddress,
        limit: usize,
    },
    /// No empty table, no unused frame and no evictable page was found.
    FramesExhausted { page: PageNumber },
    /// The table tree references a frame it must not (twice, out of range, or the root).
    StructuralCorruption { frame: FrameNumber },
    /// The address has no mapping and the read policy forbids allocating one.
    NotPresent { address: VirtualAddress },
}

impl fmt::Display for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGeometry(reason) => write!(f, "invalid geometry: {}", reason),
            Self::AddressOutOfRange { address, limit } => write!(
                f,
                "virtual address {} is outside the address space (limit {:#x})",
                address, limit
            ),
            Self::FramesExhausted { page } => {
                write!(f, "no frame available to back page {}", page)
            }
            Self::StructuralCorruption { frame } => {
                write!(f, "page table structure is corrupt at frame {}", frame)
            }
            Self::NotPresent { address } => {
                write!(f, "virtual address {} is not mapped", address)
            }
        }
    }
}

impl core::error::Error for MmuError {}
