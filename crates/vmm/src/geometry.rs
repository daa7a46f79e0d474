//! Address-space geometry.
//!
//! Everything the walker needs to know about the shape of the table tree is
//! derived from four constants: the offset width, the virtual address width,
//! the table depth and the number of physical frames. [`Geometry`] validates
//! them once and precomputes the per-level bit widths, so every other
//! computation here is a pure function of an immutable value.
//!
//! # Level widths
//!
//! Every table level consumes `OFFSET_WIDTH` bits of the page number except
//! the root, which takes whatever is left over:
//!
//! ```text
//! root_bits = (VIRTUAL_ADDRESS_WIDTH - OFFSET_WIDTH) - (TABLES_DEPTH - 1) * OFFSET_WIDTH
//! ```
//!
//! With `VIRTUAL_ADDRESS_WIDTH = 10`, `OFFSET_WIDTH = 4`, `TABLES_DEPTH = 2`
//! the page number is 6 bits wide, the root takes the top 2 and the leaf table
//! the low 4.

use core::ops::Deref;

use crate::{FrameNumber, MmuError, PageNumber, PhysicalAddress, VirtualAddress};

/// Upper bound on the table depth, so that per-level data fits in fixed arrays.
pub const MAX_TABLES_DEPTH: usize = 48;

/// Largest supported offset width (64 Ki words per frame).
const MAX_OFFSET_WIDTH: u32 = 16;

/// Largest supported virtual address width.
const MAX_VIRTUAL_ADDRESS_WIDTH: u32 = 48;

/// The validated configuration of one emulated address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    offset_width: u32,
    virtual_address_width: u32,
    tables_depth: usize,
    num_frames: usize,
    /// Index width of each level, root first.
    level_bits: [u32; MAX_TABLES_DEPTH],
    /// Position of each level's index inside the page number.
    level_shift: [u32; MAX_TABLES_DEPTH],
}

impl Geometry {
    /// Builds a geometry, rejecting constants that cannot describe a table tree.
    pub fn new(
        offset_width: u32,
        virtual_address_width: u32,
        tables_depth: usize,
        num_frames: usize,
    ) -> Result<Self, MmuError> {
        if offset_width == 0 || offset_width > MAX_OFFSET_WIDTH {
            return Err(MmuError::InvalidGeometry("offset width must be in 1..=16"));
        }
        if virtual_address_width < offset_width {
            return Err(MmuError::InvalidGeometry(
                "virtual address width is smaller than the offset width",
            ));
        }
        if virtual_address_width > MAX_VIRTUAL_ADDRESS_WIDTH {
            return Err(MmuError::InvalidGeometry(
                "virtual address width must not exceed 48 bits",
            ));
        }
        if tables_depth == 0 || tables_depth > MAX_TABLES_DEPTH {
            return Err(MmuError::InvalidGeometry("table depth must be in 1..=48"));
        }

        let page_bits = (virtual_address_width - offset_width) as usize;
        let lower_bits = (tables_depth - 1) * offset_width as usize;
        if lower_bits > page_bits || page_bits - lower_bits > offset_width as usize {
            return Err(MmuError::InvalidGeometry(
                "table depth does not match the page number width",
            ));
        }
        let root_bits = (page_bits - lower_bits) as u32;

        if num_frames <= tables_depth {
            return Err(MmuError::InvalidGeometry(
                "need more frames than table levels to resolve any address",
            ));
        }
        if num_frames.checked_mul(1usize << offset_width).is_none() {
            return Err(MmuError::InvalidGeometry("RAM size overflows"));
        }

        let mut level_bits = [0u32; MAX_TABLES_DEPTH];
        let mut level_shift = [0u32; MAX_TABLES_DEPTH];
        level_bits[0] = root_bits;
        for bits in &mut level_bits[1..tables_depth] {
            *bits = offset_width;
        }
        // The leaf level holds the least significant bits.
        let mut shift = 0;
        for level in (0..tables_depth).rev() {
            level_shift[level] = shift;
            shift += level_bits[level];
        }

        Ok(Self {
            offset_width,
            virtual_address_width,
            tables_depth,
            num_frames,
            level_bits,
            level_shift,
        })
    }

    pub const fn offset_width(&self) -> u32 {
        self.offset_width
    }

    pub const fn virtual_address_width(&self) -> u32 {
        self.virtual_address_width
    }

    pub const fn tables_depth(&self) -> usize {
        self.tables_depth
    }

    pub const fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Number of words in a frame (and entries in a full table).
    pub const fn frame_size(&self) -> usize {
        1 << self.offset_width
    }

    /// Number of pages in the virtual address space.
    pub const fn num_pages(&self) -> usize {
        1 << (self.virtual_address_width - self.offset_width)
    }

    /// Number of words of emulated RAM.
    pub const fn ram_size(&self) -> usize {
        self.num_frames * self.frame_size()
    }

    /// Number of words in the virtual address space.
    pub const fn virtual_memory_size(&self) -> usize {
        self.num_pages() * self.frame_size()
    }

    /// Index width of every level, root first.
    pub fn bits_per_level(&self) -> &[u32] {
        &self.level_bits[..self.tables_depth]
    }

    /// Number of entries a table at `level` actually uses.
    ///
    /// # Panics
    /// Panics if `level` is not a table level.
    pub fn entries_at(&self, level: usize) -> usize {
        assert!(level < self.tables_depth, "table level out of range");
        1 << self.level_bits[level]
    }

    /// Splits a virtual address into its page number and in-page offset.
    pub fn decompose(&self, address: VirtualAddress) -> Result<(PageNumber, usize), MmuError> {
        let raw = address.as_usize();
        if raw >= self.virtual_memory_size() {
            return Err(MmuError::AddressOutOfRange {
                address,
                limit: self.virtual_memory_size(),
            });
        }
        let offset = raw & (self.frame_size() - 1);
        let page = raw >> self.offset_width;
        Ok((PageNumber::new(page), offset))
    }

    /// Returns the table index used at `level` when walking to `page`.
    pub fn level_index(&self, page: PageNumber, level: usize) -> usize {
        assert!(level < self.tables_depth, "table level out of range");
        let mask = (1usize << self.level_bits[level]) - 1;
        (page.as_usize() >> self.level_shift[level]) & mask
    }

    /// Splits a page number into one table index per level, root first.
    pub fn split_page_index(&self, page: PageNumber) -> LevelIndices {
        let mut indices = [0usize; MAX_TABLES_DEPTH];
        for (level, index) in indices[..self.tables_depth].iter_mut().enumerate() {
            *index = self.level_index(page, level);
        }
        LevelIndices {
            indices,
            len: self.tables_depth,
        }
    }

    /// Reassembles a page number from per-level indices, root first.
    ///
    /// # Panics
    /// Panics if the number of indices differs from the table depth.
    pub fn join_levels(&self, indices: &[usize]) -> PageNumber {
        assert_eq!(
            indices.len(),
            self.tables_depth,
            "one index per table level expected"
        );
        let page = indices
            .iter()
            .zip(self.bits_per_level())
            .fold(0usize, |path, (&index, &bits)| (path << bits) | index);
        PageNumber::new(page)
    }

    /// Extends a partial page path by one level.
    pub(crate) fn extend_path(&self, path: usize, level: usize, index: usize) -> usize {
        (path << self.level_bits[level]) | index
    }

    /// Returns the physical address of the first word of `frame`.
    pub fn frame_base(&self, frame: FrameNumber) -> PhysicalAddress {
        PhysicalAddress::new(frame.as_usize() * self.frame_size())
    }

    /// Returns the physical address of cell `index` in `frame`.
    pub fn cell(&self, frame: FrameNumber, index: usize) -> PhysicalAddress {
        debug_assert!(index < self.frame_size(), "cell index out of range");
        self.frame_base(frame) + index
    }

    /// Distance between two pages on a ring of `NUM_PAGES` pages.
    pub fn cyclic_distance(&self, a: PageNumber, b: PageNumber) -> usize {
        let direct = a.as_usize().abs_diff(b.as_usize());
        direct.min(self.num_pages() - direct)
    }
}

impl Default for Geometry {
    /// 16-word frames, 20-bit virtual addresses, four table levels, 64 frames.
    fn default() -> Self {
        match Self::new(4, 20, 4, 64) {
            Ok(geometry) => geometry,
            Err(_) => unreachable!("default geometry is valid"),
        }
    }
}

/// Per-level table indices of one page number, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelIndices {
    indices: [usize; MAX_TABLES_DEPTH],
    len: usize,
}

impl LevelIndices {
    pub fn as_slice(&self) -> &[usize] {
        &self.indices[..self.len]
    }
}

impl Deref for LevelIndices {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        self.as_slice()
    }
}
