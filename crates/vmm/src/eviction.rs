//! Victim selection and cleanup for page eviction.
//!
//! When RAM is full the allocator gives up a resident page. The victim is the
//! page farthest from the incoming one on the page ring: under a cyclic
//! reference pattern it is the one least likely to be needed soon.

use crate::{
    FrameNumber, Geometry, PageNumber, PhysicalMemory, ProtectionSet,
    scan::{self, TreeScan},
};

/// A resident page chosen for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victim {
    pub frame: FrameNumber,
    pub page: PageNumber,
    /// Cyclic distance from the incoming page.
    pub distance: usize,
}

/// Picks the unprotected resident page farthest from `incoming`.
///
/// Ties go to the lowest frame number. Returns None if every resident page is
/// protected (or there are none).
pub fn select_victim(
    scan: &TreeScan,
    geometry: &Geometry,
    incoming: PageNumber,
    protection: &ProtectionSet,
) -> Option<Victim> {
    let mut best: Option<Victim> = None;

    for (frame, page) in scan.pages() {
        if protection.contains(frame) {
            continue;
        }
        let distance = geometry.cyclic_distance(incoming, page);
        if best.is_none_or(|victim| distance > victim.distance) {
            best = Some(Victim {
                frame,
                page,
                distance,
            });
        }
    }

    best
}

/// Swaps the victim out and leaves its frame zeroed and detached.
///
/// The backing store persists the content first, then the parent entry is
/// cleared and the frame wiped.
pub fn evict<M>(memory: &mut M, geometry: &Geometry, victim: &Victim)
where
    M: PhysicalMemory + ?Sized,
{
    log::debug!(
        "evicting page {} from frame {} (distance {})",
        victim.page,
        victim.frame,
        victim.distance
    );

    memory.evict(victim.frame, victim.page);

    let removed = scan::remove_references(memory, geometry, victim.frame);
    assert_eq!(removed, 1, "evicted frame must have exactly one parent");

    scan::clear_subtree(memory, geometry, victim.frame, geometry.tables_depth());
}
