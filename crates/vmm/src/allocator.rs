//! Frame allocation for missing table levels.
//!
//! There is no free list: the tree itself is the only record of which frames
//! are in use. Every allocation scans it and then tries, in order:
//!
//! 1. an empty, unprotected table (or an unreferenced frame) at or below the
//!    highest frame in use, detaching it from its parent;
//! 2. the frame just past the highest one in use, if RAM has room;
//! 3. evicting the resident page farthest from the one being swapped in.

use crate::{
    FrameNumber, Geometry, MmuError, PageNumber, PhysicalMemory, ProtectionSet,
    eviction,
    scan::{self, FrameRole, TreeScan},
};

/// Where a newly allocated frame will be linked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    /// The page the walk is resolving; the eviction tie-break key.
    pub page: PageNumber,
    /// The table that will reference the new frame.
    pub parent: FrameNumber,
    /// The entry in `parent` that will hold the new frame number.
    pub parent_index: usize,
}

/// How a frame was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// An empty table was detached from its parent and reused.
    ReusedTable,
    /// A frame no table referenced was picked up.
    Orphan,
    /// A never-used frame past the highest one in use.
    Grown,
    /// The given page was swapped out to free its frame.
    Evicted(PageNumber),
}

/// Produces a zero-filled frame that is not referenced from the tree.
pub fn allocate<M>(
    memory: &mut M,
    geometry: &Geometry,
    request: &FrameRequest,
    protection: &ProtectionSet,
) -> Result<(FrameNumber, Allocation), MmuError>
where
    M: PhysicalMemory + ?Sized,
{
    let tree = TreeScan::run(memory, geometry)?;
    let max_frame = tree.max_frame();

    log::trace!(
        "allocating for page {} at frame {} entry {} (max frame {})",
        request.page,
        request.parent,
        request.parent_index,
        max_frame
    );

    let (frame, allocation) = if let Some(found) = reuse(memory, geometry, &tree, protection) {
        found
    } else if max_frame.as_usize() + 1 < geometry.num_frames() {
        let frame = max_frame + 1;
        memory.clear_frame(geometry, frame);
        log::debug!("growing into frame {}", frame);
        (frame, Allocation::Grown)
    } else {
        let Some(victim) = eviction::select_victim(&tree, geometry, request.page, protection)
        else {
            log::error!(
                "no frame available for page {}: {} frames in use, {} protected",
                request.page,
                tree.used_frames(),
                protection.len()
            );
            return Err(MmuError::FramesExhausted { page: request.page });
        };
        eviction::evict(memory, geometry, &victim);
        (victim.frame, Allocation::Evicted(victim.page))
    };

    assert!(
        frame.as_usize() < geometry.num_frames(),
        "allocated frame out of range"
    );
    debug_assert_ne!(frame, request.parent, "frame allocated as its own child");
    Ok((frame, allocation))
}

/// Finds the lowest reusable frame at or below the highest one in use.
fn reuse<M>(
    memory: &mut M,
    geometry: &Geometry,
    tree: &TreeScan,
    protection: &ProtectionSet,
) -> Option<(FrameNumber, Allocation)>
where
    M: PhysicalMemory + ?Sized,
{
    for raw in 1..=tree.max_frame().as_usize() {
        let frame = FrameNumber::new(raw);
        if protection.contains(frame) {
            continue;
        }

        match tree.role(frame) {
            FrameRole::Table { .. } if memory.is_frame_empty(geometry, frame) => {
                scan::remove_references(memory, geometry, frame);
                log::debug!("reusing empty table frame {}", frame);
                return Some((frame, Allocation::ReusedTable));
            }
            FrameRole::Unused => {
                memory.clear_frame(geometry, frame);
                log::debug!("reusing unreferenced frame {}", frame);
                return Some((frame, Allocation::Orphan));
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmulatedMemory, Word};

    /// Two levels, 8 frames: root + up to 7 tables/pages.
    fn geometry() -> Geometry {
        Geometry::new(4, 10, 2, 8).unwrap()
    }

    fn link(mem: &mut EmulatedMemory, table: usize, index: usize, child: usize) {
        mem.write(
            geometry().cell(FrameNumber::new(table), index),
            child as Word,
        );
    }

    fn request(page: usize) -> FrameRequest {
        FrameRequest {
            page: PageNumber::new(page),
            parent: FrameNumber::ROOT,
            parent_index: 0,
        }
    }

    #[test]
    fn grows_into_next_frame() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);
        link(&mut mem, 1, 3, 2);
        mem.write(g.cell(FrameNumber::new(2), 0), 5);

        let (frame, how) = allocate(&mut mem, &g, &request(4), &ProtectionSet::new()).unwrap();
        assert_eq!(frame, FrameNumber::new(3));
        assert_eq!(how, Allocation::Grown);
    }

    #[test]
    fn grown_frame_is_zeroed() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        mem.write(g.cell(FrameNumber::new(1), 6), 123);

        let (frame, _) = allocate(&mut mem, &g, &request(0), &ProtectionSet::new()).unwrap();
        assert_eq!(frame, FrameNumber::new(1));
        assert!(mem.is_frame_empty(&g, frame));
    }

    #[test]
    fn prefers_empty_table_over_growth() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1); // table 1, empty
        link(&mut mem, 0, 1, 2); // table 2
        link(&mut mem, 2, 0, 3); // page 16

        let (frame, how) = allocate(&mut mem, &g, &request(40), &ProtectionSet::new()).unwrap();
        assert_eq!(frame, FrameNumber::new(1));
        assert_eq!(how, Allocation::ReusedTable);
        // Detached from the root.
        assert_eq!(mem.read(g.cell(FrameNumber::ROOT, 0)), 0);
    }

    #[test]
    fn never_reuses_data_frames() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 2);
        link(&mut mem, 2, 0, 1); // page 0 in frame 1, all zero content

        let (frame, how) = allocate(&mut mem, &g, &request(20), &ProtectionSet::new()).unwrap();
        assert_eq!(frame, FrameNumber::new(3));
        assert_eq!(how, Allocation::Grown);
    }

    #[test]
    fn skips_protected_empty_table() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);

        let mut protection = ProtectionSet::new();
        protection.protect(FrameNumber::new(1));
        let (frame, how) = allocate(&mut mem, &g, &request(0), &protection).unwrap();
        assert_eq!(frame, FrameNumber::new(2));
        assert_eq!(how, Allocation::Grown);
    }

    #[test]
    fn picks_up_unreferenced_frame() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);
        link(&mut mem, 1, 0, 3); // frame 2 is a hole
        mem.write(g.cell(FrameNumber::new(2), 1), 9);

        let (frame, how) = allocate(&mut mem, &g, &request(1), &ProtectionSet::new()).unwrap();
        assert_eq!(frame, FrameNumber::new(2));
        assert_eq!(how, Allocation::Orphan);
        assert!(mem.is_frame_empty(&g, frame));
    }

    /// Root -> tables 1 and 2; pages 0..=2 in frames 3..=5, pages 48, 49 in 6, 7.
    fn full_memory() -> EmulatedMemory {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);
        link(&mut mem, 0, 3, 2);
        for (index, frame) in [(0, 3), (1, 4), (2, 5)] {
            link(&mut mem, 1, index, frame);
            mem.write(g.cell(FrameNumber::new(frame), 0), 100 + frame as Word);
        }
        for (index, frame) in [(0, 6), (1, 7)] {
            link(&mut mem, 2, index, frame);
            mem.write(g.cell(FrameNumber::new(frame), 0), 100 + frame as Word);
        }
        mem
    }

    #[test]
    fn evicts_when_full() {
        let g = geometry();
        let mut mem = full_memory();

        // Page 17: distances 17, 16, 15 to pages 0..=2 and 31, 32 to 48, 49.
        let (frame, how) = allocate(&mut mem, &g, &request(17), &ProtectionSet::new()).unwrap();
        assert_eq!(frame, FrameNumber::new(7));
        assert_eq!(how, Allocation::Evicted(PageNumber::new(49)));
        assert_eq!(mem.swapped(PageNumber::new(49)).unwrap()[0], 107);
        assert!(mem.is_frame_empty(&g, frame));
        assert_eq!(mem.read(g.cell(FrameNumber::new(2), 1)), 0);
    }

    #[test]
    fn exhausted_when_everything_is_protected() {
        let g = geometry();
        let mut mem = full_memory();
        let mut protection = ProtectionSet::new();
        for frame in 1..8 {
            protection.protect(FrameNumber::new(frame));
        }

        assert_eq!(
            allocate(&mut mem, &g, &request(17), &protection),
            Err(MmuError::FramesExhausted {
                page: PageNumber::new(17)
            })
        );
    }

    #[test]
    fn reports_corrupt_tree() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);
        link(&mut mem, 0, 1, 1);

        assert_eq!(
            allocate(&mut mem, &g, &request(0), &ProtectionSet::new()),
            Err(MmuError::StructuralCorruption {
                frame: FrameNumber::new(1)
            })
        );
    }
}
