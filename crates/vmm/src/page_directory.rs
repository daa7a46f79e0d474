//! Table walks from the root frame.
//!
//! This module provides the `PageDirectory` type, which walks the table tree
//! for a virtual address. The allocating walk materializes every missing level
//! on the way down and asks the backing store to restore the page content
//! when the data frame itself had to be created.

use crate::{
    FrameNumber, Geometry, MmuError, PhysicalAddress, PhysicalMemory, ProtectionSet,
    VirtualAddress,
    address_space::Stats,
    allocator::{self, FrameRequest},
};

/// Walks the table tree rooted at frame 0 for one geometry.
#[derive(Debug, Clone, Copy)]
pub struct PageDirectory {
    geometry: Geometry,
}

impl PageDirectory {
    pub fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Resolves a virtual address, allocating missing tables and the data frame.
    ///
    /// Every frame the walk descends into is added to `protection`, so a later
    /// level of the same walk can neither reuse nor evict it.
    pub fn resolve<M>(
        &self,
        memory: &mut M,
        address: VirtualAddress,
        protection: &mut ProtectionSet,
        stats: &mut Stats,
    ) -> Result<PhysicalAddress, MmuError>
    where
        M: PhysicalMemory + ?Sized,
    {
        let geometry = &self.geometry;
        let (page, offset) = geometry.decompose(address)?;
        let indices = geometry.split_page_index(page);
        let leaf_level = geometry.tables_depth() - 1;

        log::trace!("resolving {} (page {}, offset {})", address, page, offset);

        let mut current = FrameNumber::ROOT;
        for (level, &index) in indices.iter().enumerate() {
            let cell = geometry.cell(current, index);
            let next = match FrameNumber::from_entry(memory.read(cell)) {
                Some(next) => self.check_entry(current, index, next)?,
                None => {
                    let request = FrameRequest {
                        page,
                        parent: current,
                        parent_index: index,
                    };
                    let (frame, allocation) =
                        allocator::allocate(memory, geometry, &request, protection)?;
                    stats.record(allocation);
                    memory.write(cell, frame.to_entry());

                    if level == leaf_level {
                        log::trace!("restoring page {} into frame {}", page, frame);
                        memory.restore(frame, page);
                        stats.restores += 1;
                    }
                    frame
                }
            };

            log::trace!("level {} entry {}: frame {} -> frame {}", level, index, current, next);
            protection.protect(next);
            current = next;
        }

        assert!(
            current.as_usize() < geometry.num_frames(),
            "resolved frame out of range"
        );
        assert!(offset < geometry.frame_size(), "offset out of range");

        Ok(geometry.cell(current, offset))
    }

    /// Resolves a virtual address without allocating.
    ///
    /// Returns None if any level on the way is unmapped.
    pub fn walk<M>(
        &self,
        memory: &M,
        address: VirtualAddress,
    ) -> Result<Option<PhysicalAddress>, MmuError>
    where
        M: PhysicalMemory + ?Sized,
    {
        let geometry = &self.geometry;
        let (page, offset) = geometry.decompose(address)?;

        let mut current = FrameNumber::ROOT;
        for &index in geometry.split_page_index(page).iter() {
            let entry = memory.read(geometry.cell(current, index));
            let Some(next) = FrameNumber::from_entry(entry) else {
                return Ok(None);
            };
            current = self.check_entry(current, index, next)?;
        }

        Ok(Some(geometry.cell(current, offset)))
    }

    fn check_entry(
        &self,
        table: FrameNumber,
        index: usize,
        next: FrameNumber,
    ) -> Result<FrameNumber, MmuError> {
        if next.as_usize() >= self.geometry.num_frames() {
            log::error!(
                "table frame {} entry {} points past the end of RAM ({})",
                table,
                index,
                next
            );
            return Err(MmuError::StructuralCorruption { frame: next });
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmulatedMemory, PageNumber, Word, scan::TreeScan};

    fn setup(offset: u32, width: u32, depth: usize, frames: usize) -> (PageDirectory, EmulatedMemory) {
        let geometry = Geometry::new(offset, width, depth, frames).unwrap();
        (PageDirectory::new(geometry), EmulatedMemory::new(geometry))
    }

    fn resolve(dir: &PageDirectory, mem: &mut EmulatedMemory, address: usize) -> PhysicalAddress {
        dir.resolve(
            mem,
            VirtualAddress::new(address),
            &mut ProtectionSet::new(),
            &mut Stats::default(),
        )
        .unwrap()
    }

    #[test]
    fn first_walk_allocates_one_frame_per_level() {
        let (dir, mut mem) = setup(4, 20, 4, 64);
        let mut stats = Stats::default();
        let mut protection = ProtectionSet::new();

        let phys = dir
            .resolve(&mut mem, VirtualAddress::new(0x12345), &mut protection, &mut stats)
            .unwrap();

        // Frames 1..=4 are grown in order, the last one holds the page.
        assert_eq!(phys, PhysicalAddress::new(4 * 16 + 5));
        assert_eq!(mem.read(PhysicalAddress::new(0x1)), 1);
        assert_eq!(mem.read(PhysicalAddress::new(16 + 0x2)), 2);
        assert_eq!(mem.read(PhysicalAddress::new(2 * 16 + 0x3)), 3);
        assert_eq!(mem.read(PhysicalAddress::new(3 * 16 + 0x4)), 4);
        assert_eq!(stats.frames_grown, 4);
        assert_eq!(stats.restores, 1);
        assert_eq!(
            protection.iter().collect::<Vec<_>>(),
            (1..=4).map(FrameNumber::new).collect::<Vec<_>>()
        );
    }

    #[test]
    fn second_walk_reuses_mapping() {
        let (dir, mut mem) = setup(4, 20, 4, 64);
        let first = resolve(&dir, &mut mem, 0x12340);

        let mut stats = Stats::default();
        let second = dir
            .resolve(
                &mut mem,
                VirtualAddress::new(0x1234F),
                &mut ProtectionSet::new(),
                &mut stats,
            )
            .unwrap();

        assert_eq!(second, first + 0xF);
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn shares_upper_levels() {
        let (dir, mut mem) = setup(4, 20, 4, 64);
        resolve(&dir, &mut mem, 0x12340);
        let phys = resolve(&dir, &mut mem, 0x12350);

        // Only the data frame is new.
        assert_eq!(phys, PhysicalAddress::new(5 * 16));
    }

    #[test]
    fn rejects_out_of_range_address() {
        let (dir, mut mem) = setup(4, 10, 2, 8);
        let result = dir.resolve(
            &mut mem,
            VirtualAddress::new(1 << 10),
            &mut ProtectionSet::new(),
            &mut Stats::default(),
        );
        assert!(matches!(result, Err(MmuError::AddressOutOfRange { .. })));
        // Nothing was touched.
        assert!(mem.is_frame_empty(dir.geometry(), FrameNumber::ROOT));
    }

    #[test]
    fn restores_evicted_content() {
        let (dir, mut mem) = setup(4, 10, 2, 8);
        let g = *dir.geometry();
        let evicted = [5 as Word; 16];
        let page = PageNumber::new(33);
        // Stage swap content by evicting a filled frame.
        for (index, value) in evicted.iter().enumerate() {
            mem.write(g.cell(FrameNumber::new(7), index), *value);
        }
        mem.evict(FrameNumber::new(7), page);
        mem.clear_frame(&g, FrameNumber::new(7));

        let phys = resolve(&dir, &mut mem, 33 * 16 + 2);
        assert_eq!(mem.read(phys), 5);
    }

    #[test]
    fn walk_does_not_allocate() {
        let (dir, mut mem) = setup(4, 10, 2, 8);
        assert_eq!(dir.walk(&mem, VirtualAddress::new(0x123)).unwrap(), None);
        assert!(mem.is_frame_empty(dir.geometry(), FrameNumber::ROOT));

        let phys = resolve(&dir, &mut mem, 0x123);
        assert_eq!(dir.walk(&mem, VirtualAddress::new(0x123)).unwrap(), Some(phys));
    }

    #[test]
    fn walk_reports_corrupt_entry() {
        let (dir, mut mem) = setup(4, 10, 2, 8);
        mem.write(PhysicalAddress::new(0), 200);
        assert_eq!(
            dir.walk(&mem, VirtualAddress::new(0x5)),
            Err(MmuError::StructuralCorruption {
                frame: FrameNumber::new(200)
            })
        );
    }

    #[test]
    fn protects_new_tables_under_pressure() {
        // Three levels of 2-bit indices, five frames: root + one chain + one spare.
        let (dir, mut mem) = setup(2, 8, 3, 5);
        let g = *dir.geometry();
        resolve(&dir, &mut mem, 0);

        // A fresh root entry needs three frames. The walk grows into frame 4,
        // then has to evict page 0 for the middle level and reclaim the table
        // that eviction emptied for the last one. Frame 4, itself still empty
        // when the middle level is allocated, must not be handed out again.
        let mut protection = ProtectionSet::new();
        let mut stats = Stats::default();
        let phys = dir
            .resolve(
                &mut mem,
                VirtualAddress::new(0b11_00_00_00),
                &mut protection,
                &mut stats,
            )
            .unwrap();

        assert_eq!(phys, g.cell(FrameNumber::new(2), 0));
        assert_eq!(mem.read(g.cell(FrameNumber::ROOT, 3)), 4);
        assert_eq!(mem.read(g.cell(FrameNumber::new(4), 0)), 3);
        assert_eq!(mem.read(g.cell(FrameNumber::new(3), 0)), 2);
        assert_eq!(stats.frames_grown, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.tables_reused, 1);
        assert_eq!(mem.swapped_pages(), 1);

        let tree = TreeScan::run(&mem, &g).unwrap();
        assert_eq!(
            tree.pages().collect::<Vec<_>>(),
            vec![(FrameNumber::new(2), PageNumber::new(0b11_00_00))]
        );
    }
}
