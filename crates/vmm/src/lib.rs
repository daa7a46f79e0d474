#![cfg_attr(not(test), no_std)]

//! # Virtual Memory Manager (VMM)
//!
//! The VMM crate emulates a hierarchical page-table MMU over a small,
//! word-addressed physical RAM with a swap store behind it. It provides:
//!
//! - Address geometry: splitting virtual addresses into per-level table indices.
//! - Table walks that materialize missing tables and data frames on demand.
//! - Frame allocation with no free list, driven by scans of the table tree.
//! - Eviction of the resident page farthest from the incoming one.
//! - An in-memory backing store for testing and the simulator.
//!
//! The table tree is the only bookkeeping: it lives in RAM and frame 0 always
//! holds the root table.

extern crate alloc;

mod address;
mod address_space;
pub mod allocator;
mod emulated;
mod error;
pub mod eviction;
mod geometry;
mod memory;
mod numbers;
mod page_directory;
mod protection;
pub mod scan;

pub use address::{PhysicalAddress, VirtualAddress};
pub use address_space::{AddressSpace, ReadPolicy, Stats};
pub use emulated::EmulatedMemory;
pub use error::MmuError;
pub use geometry::{Geometry, LevelIndices, MAX_TABLES_DEPTH};
pub use memory::{PhysicalMemory, Word};
pub use numbers::{FrameNumber, PageNumber};
pub use page_directory::PageDirectory;
pub use protection::ProtectionSet;
