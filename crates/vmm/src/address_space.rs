//! Address space management.
//!
//! This module provides [`AddressSpace`], the public face of the engine: it
//! owns the backing store and the table walker for one geometry and turns
//! virtual reads and writes into physical ones.

use alloc::collections::BTreeMap;

use crate::{
    FrameNumber, Geometry, MmuError, PageDirectory, PageNumber, PhysicalAddress, PhysicalMemory,
    ProtectionSet, VirtualAddress, Word, allocator::Allocation, scan::TreeScan,
};

/// What a read of an unmapped virtual address does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Materialize the table chain and restore the page, exactly like a write.
    #[default]
    Allocate,
    /// Fail with [`MmuError::NotPresent`] and leave the tables untouched.
    ///
    /// A page that was written and later evicted is unmapped too, so its
    /// content cannot be read back under this policy.
    NotPresent,
}

/// Counters kept by an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Successful virtual-to-physical translations.
    pub translations: usize,
    /// Empty tables detached and handed out again.
    pub tables_reused: usize,
    /// Unreferenced frames picked up below the highest frame in use.
    pub orphans_reclaimed: usize,
    /// Never-used frames taken past the highest one in use.
    pub frames_grown: usize,
    /// Pages swapped out to make room.
    pub evictions: usize,
    /// Restore requests issued for newly materialized data frames.
    pub restores: usize,
}

impl Stats {
    pub(crate) fn record(&mut self, allocation: Allocation) {
        match allocation {
            Allocation::ReusedTable => self.tables_reused += 1,
            Allocation::Orphan => self.orphans_reclaimed += 1,
            Allocation::Grown => self.frames_grown += 1,
            Allocation::Evicted(_) => self.evictions += 1,
        }
    }
}

/// One emulated virtual address space on top of a backing store.
pub struct AddressSpace<M> {
    directory: PageDirectory,
    memory: M,
    read_policy: ReadPolicy,
    stats: Stats,
}

impl<M: PhysicalMemory> AddressSpace<M> {
    /// Creates an address space over `memory` and clears the root table.
    pub fn new(geometry: Geometry, memory: M) -> Self {
        let mut space = Self {
            directory: PageDirectory::new(geometry),
            memory,
            read_policy: ReadPolicy::default(),
            stats: Stats::default(),
        };
        space.initialize();
        space
    }

    /// Sets what reads of unmapped addresses do.
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// Clears the root table and the counters, unmapping every page.
    ///
    /// Frames other than the root keep their content until they are allocated
    /// again; allocation always zero-fills.
    pub fn initialize(&mut self) {
        let geometry = *self.directory.geometry();
        self.memory.clear_frame(&geometry, FrameNumber::ROOT);
        self.stats = Stats::default();
        log::debug!(
            "initialized address space: {} frames of {} words, {} pages",
            geometry.num_frames(),
            geometry.frame_size(),
            geometry.num_pages()
        );
    }

    /// Resolves `address` to a physical address, allocating as needed.
    pub fn translate(&mut self, address: VirtualAddress) -> Result<PhysicalAddress, MmuError> {
        // Protection lasts for exactly one walk.
        let mut protection = ProtectionSet::new();
        let phys =
            self.directory
                .resolve(&mut self.memory, address, &mut protection, &mut self.stats)?;
        self.stats.translations += 1;
        Ok(phys)
    }

    /// Reads the word at a virtual address.
    pub fn read(&mut self, address: VirtualAddress) -> Result<Word, MmuError> {
        let phys = match self.read_policy {
            ReadPolicy::Allocate => self.translate(address)?,
            ReadPolicy::NotPresent => {
                let phys = self
                    .directory
                    .walk(&self.memory, address)?
                    .ok_or(MmuError::NotPresent { address })?;
                self.stats.translations += 1;
                phys
            }
        };
        self.check_physical(phys);
        Ok(self.memory.read(phys))
    }

    /// Writes a word to a virtual address.
    pub fn write(&mut self, address: VirtualAddress, value: Word) -> Result<(), MmuError> {
        let phys = self.translate(address)?;
        self.check_physical(phys);
        self.memory.write(phys, value);
        Ok(())
    }

    /// Every resident page and the frame that holds it.
    pub fn resident_pages(&self) -> Result<BTreeMap<PageNumber, FrameNumber>, MmuError> {
        let tree = TreeScan::run(&self.memory, self.directory.geometry())?;
        Ok(tree.pages().map(|(frame, page)| (page, frame)).collect())
    }

    /// Scans the whole tree, reporting a frame with more than one parent or
    /// any other structural damage. Returns the number of frames in use.
    pub fn check(&self) -> Result<usize, MmuError> {
        TreeScan::run(&self.memory, self.directory.geometry()).map(|tree| tree.used_frames())
    }

    pub fn geometry(&self) -> &Geometry {
        self.directory.geometry()
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Consumes the address space, returning the backing store.
    pub fn into_memory(self) -> M {
        self.memory
    }

    fn check_physical(&self, phys: PhysicalAddress) {
        assert!(
            phys.as_usize() < self.geometry().ram_size(),
            "physical address beyond RAM"
        );
    }
}
