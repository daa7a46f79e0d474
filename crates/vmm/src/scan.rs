//! Whole-tree traversals over the table frames.
//!
//! The table tree lives entirely in RAM, so every question about which frames
//! are in use has to be answered by walking it from the root. The traversals
//! here use an explicit stack bounded by the table depth and a visited map,
//! so a corrupted tree is reported instead of looping.

use alloc::{vec, vec::Vec};

use crate::{FrameNumber, Geometry, MmuError, PageNumber, PhysicalAddress, PhysicalMemory};

/// What a frame is used for, as seen from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRole {
    /// Not referenced from the tree.
    Unused,
    /// A table at the given level (the root is level 0).
    Table { level: usize },
    /// A data frame backing the given page.
    Page(PageNumber),
}

/// A snapshot of the table tree.
#[derive(Debug)]
pub struct TreeScan {
    max_frame: FrameNumber,
    roles: Vec<FrameRole>,
    /// The table cell that references each frame.
    parents: Vec<Option<PhysicalAddress>>,
}

impl TreeScan {
    /// Walks the whole tree from the root frame.
    ///
    /// Fails if an entry names the root, names a frame past the end of RAM, or
    /// names a frame that is already referenced elsewhere in the tree.
    pub fn run<M>(memory: &M, geometry: &Geometry) -> Result<Self, MmuError>
    where
        M: PhysicalMemory + ?Sized,
    {
        let num_frames = geometry.num_frames();
        let leaf_level = geometry.tables_depth() - 1;

        let mut roles = vec![FrameRole::Unused; num_frames];
        let mut parents = vec![None; num_frames];
        let mut max_frame = FrameNumber::ROOT;

        roles[0] = FrameRole::Table { level: 0 };
        let mut stack = vec![(FrameNumber::ROOT, 0usize, 0usize)];

        while let Some((table, level, path)) = stack.pop() {
            for index in 0..geometry.entries_at(level) {
                let cell = geometry.cell(table, index);
                let Some(child) = FrameNumber::from_entry(memory.read(cell)) else {
                    continue;
                };

                if child.as_usize() >= num_frames
                    || child.is_root()
                    || roles[child.as_usize()] != FrameRole::Unused
                {
                    log::error!(
                        "table frame {} entry {} references frame {} illegally",
                        table,
                        index,
                        child
                    );
                    return Err(MmuError::StructuralCorruption { frame: child });
                }

                let child_path = geometry.extend_path(path, level, index);
                parents[child.as_usize()] = Some(cell);
                max_frame = max_frame.max(child);

                if level == leaf_level {
                    roles[child.as_usize()] = FrameRole::Page(PageNumber::new(child_path));
                } else {
                    roles[child.as_usize()] = FrameRole::Table { level: level + 1 };
                    stack.push((child, level + 1, child_path));
                }
            }
        }

        Ok(Self {
            max_frame,
            roles,
            parents,
        })
    }

    /// The highest frame number referenced from the tree (the root if none).
    pub fn max_frame(&self) -> FrameNumber {
        self.max_frame
    }

    pub fn role(&self, frame: FrameNumber) -> FrameRole {
        self.roles[frame.as_usize()]
    }

    /// The table cell that references `frame`, if it is in the tree.
    pub fn parent(&self, frame: FrameNumber) -> Option<PhysicalAddress> {
        self.parents[frame.as_usize()]
    }

    /// Number of frames in use, the root included.
    pub fn used_frames(&self) -> usize {
        self.roles
            .iter()
            .filter(|role| **role != FrameRole::Unused)
            .count()
    }

    /// Every resident data frame with the page it backs, in frame order.
    pub fn pages(&self) -> impl Iterator<Item = (FrameNumber, PageNumber)> + '_ {
        self.roles
            .iter()
            .enumerate()
            .filter_map(|(frame, role)| match role {
                FrameRole::Page(page) => Some((FrameNumber::new(frame), *page)),
                _ => None,
            })
    }
}

/// Clears every table entry that references `frame`.
///
/// Returns the number of entries cleared, which is at most one in a
/// well-formed tree.
pub(crate) fn remove_references<M>(memory: &mut M, geometry: &Geometry, frame: FrameNumber) -> usize
where
    M: PhysicalMemory + ?Sized,
{
    let leaf_level = geometry.tables_depth() - 1;
    let mut visited = vec![false; geometry.num_frames()];
    let mut stack = vec![(FrameNumber::ROOT, 0usize)];
    let mut removed = 0;

    visited[0] = true;
    while let Some((table, level)) = stack.pop() {
        for index in 0..geometry.entries_at(level) {
            let cell = geometry.cell(table, index);
            let Some(child) = FrameNumber::from_entry(memory.read(cell)) else {
                continue;
            };

            if child == frame {
                memory.write(cell, 0);
                removed += 1;
                continue;
            }

            if level < leaf_level
                && child.as_usize() < visited.len()
                && !visited[child.as_usize()]
            {
                visited[child.as_usize()] = true;
                stack.push((child, level + 1));
            }
        }
    }

    removed
}

/// Zero-fills `frame` and, if it is a table at `level`, everything below it.
///
/// `level` equal to the table depth means `frame` is a data frame.
pub(crate) fn clear_subtree<M>(memory: &mut M, geometry: &Geometry, frame: FrameNumber, level: usize)
where
    M: PhysicalMemory + ?Sized,
{
    let mut visited = vec![false; geometry.num_frames()];
    let mut stack = vec![(frame, level)];

    while let Some((current, level)) = stack.pop() {
        if visited[current.as_usize()] {
            continue;
        }
        visited[current.as_usize()] = true;

        if level < geometry.tables_depth() {
            for index in 0..geometry.entries_at(level) {
                let entry = memory.read(geometry.cell(current, index));
                if let Some(child) = FrameNumber::from_entry(entry) {
                    if child.as_usize() < geometry.num_frames() && !child.is_root() {
                        stack.push((child, level + 1));
                    }
                }
            }
        }
        memory.clear_frame(geometry, current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmulatedMemory, Word};

    /// 2-level tree: root uses 4 entries, leaf tables 16.
    fn geometry() -> Geometry {
        Geometry::new(4, 10, 2, 8).unwrap()
    }

    fn link(mem: &mut EmulatedMemory, table: usize, index: usize, child: usize) {
        let g = geometry();
        mem.write(g.cell(FrameNumber::new(table), index), child as Word);
    }

    #[test]
    fn empty_tree() {
        let g = geometry();
        let mem = EmulatedMemory::new(g);
        let scan = TreeScan::run(&mem, &g).unwrap();

        assert_eq!(scan.max_frame(), FrameNumber::ROOT);
        assert_eq!(scan.used_frames(), 1);
        assert_eq!(scan.pages().count(), 0);
    }

    #[test]
    fn records_roles_and_page_paths() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 2, 1); // root[2] -> table 1
        link(&mut mem, 1, 5, 4); // table 1 [5] -> page 0b10_0101
        link(&mut mem, 1, 0, 2); // table 1 [0] -> page 0b10_0000
        mem.write(g.cell(FrameNumber::new(4), 0), 99); // data is never followed

        let scan = TreeScan::run(&mem, &g).unwrap();
        assert_eq!(scan.max_frame(), FrameNumber::new(4));
        assert_eq!(scan.role(FrameNumber::new(1)), FrameRole::Table { level: 1 });
        assert_eq!(scan.role(FrameNumber::new(3)), FrameRole::Unused);
        assert_eq!(
            scan.pages().collect::<Vec<_>>(),
            vec![
                (FrameNumber::new(2), PageNumber::new(0b10_0000)),
                (FrameNumber::new(4), PageNumber::new(0b10_0101)),
            ]
        );
        assert_eq!(
            scan.parent(FrameNumber::new(4)),
            Some(g.cell(FrameNumber::new(1), 5))
        );
        assert_eq!(scan.used_frames(), 4);
    }

    #[test]
    fn rejects_double_parent() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);
        link(&mut mem, 0, 1, 2);
        link(&mut mem, 1, 3, 5);
        link(&mut mem, 2, 3, 5);

        assert_eq!(
            TreeScan::run(&mem, &g).unwrap_err(),
            MmuError::StructuralCorruption {
                frame: FrameNumber::new(5)
            }
        );
    }

    #[test]
    fn rejects_self_reference() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 0, 1);
        link(&mut mem, 1, 1, 1);

        assert_eq!(
            TreeScan::run(&mem, &g).unwrap_err(),
            MmuError::StructuralCorruption {
                frame: FrameNumber::new(1)
            }
        );
    }

    #[test]
    fn rejects_out_of_range_entry() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 3, 8);

        assert!(matches!(
            TreeScan::run(&mem, &g),
            Err(MmuError::StructuralCorruption { .. })
        ));
    }

    #[test]
    fn remove_references_clears_parent_entry() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 0, 1, 1);
        link(&mut mem, 1, 7, 3);
        link(&mut mem, 1, 8, 2);

        assert_eq!(remove_references(&mut mem, &g, FrameNumber::new(3)), 1);
        assert_eq!(mem.read(g.cell(FrameNumber::new(1), 7)), 0);
        assert_eq!(mem.read(g.cell(FrameNumber::new(1), 8)), 2);
        assert_eq!(remove_references(&mut mem, &g, FrameNumber::new(3)), 0);
    }

    #[test]
    fn clear_subtree_zeroes_descendants() {
        let g = geometry();
        let mut mem = EmulatedMemory::new(g);
        link(&mut mem, 1, 4, 2);
        link(&mut mem, 1, 9, 3);
        mem.write(g.cell(FrameNumber::new(2), 0), 11);
        mem.write(g.cell(FrameNumber::new(3), 15), 12);
        mem.write(g.cell(FrameNumber::new(5), 0), 13);

        clear_subtree(&mut mem, &g, FrameNumber::new(1), 1);

        for frame in 1..4 {
            assert!(mem.is_frame_empty(&g, FrameNumber::new(frame)));
        }
        assert!(!mem.is_frame_empty(&g, FrameNumber::new(5)));
    }
}
