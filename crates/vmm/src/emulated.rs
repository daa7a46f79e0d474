//! Emulated physical memory with a swap area.
//!
//! RAM is a flat buffer of `RAM_SIZE` words. Evicted pages go to an in-memory
//! swap area keyed by page number and are handed back (and dropped from swap)
//! on restore.

use alloc::{boxed::Box, collections::BTreeMap, vec, vec::Vec};

use crate::{FrameNumber, Geometry, PageNumber, PhysicalAddress, PhysicalMemory, Word};

/// Emulated RAM plus swap, sized for one [`Geometry`].
pub struct EmulatedMemory {
    geometry: Geometry,
    /// The underlying RAM buffer.
    ram: Vec<Word>,
    /// Evicted page content.
    swap: BTreeMap<PageNumber, Box<[Word]>>,
    evictions: usize,
    restores: usize,
}

impl EmulatedMemory {
    /// Creates zero-filled RAM with an empty swap area.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            ram: vec![0; geometry.ram_size()],
            swap: BTreeMap::new(),
            evictions: 0,
            restores: 0,
        }
    }

    /// Returns the size of RAM in words.
    pub fn size(&self) -> usize {
        self.ram.len()
    }

    /// Returns the content of `frame`.
    pub fn frame(&self, frame: FrameNumber) -> &[Word] {
        let base = self.geometry.frame_base(frame).as_usize();
        &self.ram[base..base + self.geometry.frame_size()]
    }

    /// Returns the swapped-out content of `page`, if any.
    pub fn swapped(&self, page: PageNumber) -> Option<&[Word]> {
        self.swap.get(&page).map(|content| &content[..])
    }

    /// Number of pages currently held in swap.
    pub fn swapped_pages(&self) -> usize {
        self.swap.len()
    }

    /// Number of `evict` calls received.
    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Number of `restore` calls that brought content back from swap.
    pub fn restores(&self) -> usize {
        self.restores
    }

    fn check(&self, address: PhysicalAddress) -> usize {
        assert!(
            address.as_usize() < self.ram.len(),
            "physical address out of bounds"
        );
        address.as_usize()
    }

    fn frame_range(&self, frame: FrameNumber) -> core::ops::Range<usize> {
        assert!(
            frame.as_usize() < self.geometry.num_frames(),
            "frame number out of bounds"
        );
        let base = self.geometry.frame_base(frame).as_usize();
        base..base + self.geometry.frame_size()
    }
}

impl PhysicalMemory for EmulatedMemory {
    fn read(&self, address: PhysicalAddress) -> Word {
        self.ram[self.check(address)]
    }

    fn write(&mut self, address: PhysicalAddress, value: Word) {
        let index = self.check(address);
        self.ram[index] = value;
    }

    fn evict(&mut self, frame: FrameNumber, page: PageNumber) {
        let range = self.frame_range(frame);
        let content = Box::from(&self.ram[range]);
        self.swap.insert(page, content);
        self.evictions += 1;
    }

    fn restore(&mut self, frame: FrameNumber, page: PageNumber) {
        let range = self.frame_range(frame);
        if let Some(content) = self.swap.remove(&page) {
            self.ram[range].copy_from_slice(&content);
            self.restores += 1;
        }
    }
}
