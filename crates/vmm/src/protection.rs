//! Frames that must survive the translation in progress.

use alloc::collections::BTreeSet;

use crate::FrameNumber;

/// Frames on the path of the current walk.
///
/// A fresh set is created for every top-level translation and dropped when it
/// returns. While it lives, the allocator neither reuses nor evicts a frame in
/// it, so a table built earlier in the walk cannot be pulled out from under a
/// later level.
#[derive(Debug, Default)]
pub struct ProtectionSet {
    frames: BTreeSet<FrameNumber>,
}

impl ProtectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `frame` as protected. Returns false if it already was.
    pub fn protect(&mut self, frame: FrameNumber) -> bool {
        self.frames.insert(frame)
    }

    /// Returns true if `frame` may not be reused or evicted.
    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame.is_root() || self.frames.contains(&frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FrameNumber> + '_ {
        self.frames.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_always_protected() {
        let set = ProtectionSet::new();
        assert!(set.is_empty());
        assert!(set.contains(FrameNumber::ROOT));
    }

    #[test]
    fn protect_and_query() {
        let mut set = ProtectionSet::new();
        assert!(set.protect(FrameNumber::new(3)));
        assert!(!set.protect(FrameNumber::new(3)));
        assert!(set.protect(FrameNumber::new(1)));

        assert!(set.contains(FrameNumber::new(3)));
        assert!(!set.contains(FrameNumber::new(2)));
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![FrameNumber::new(1), FrameNumber::new(3)]
        );
    }
}
