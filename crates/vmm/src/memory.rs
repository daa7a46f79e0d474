//! The backing store the engine translates into.
//!
//! The engine does not own RAM. It drives a [`PhysicalMemory`] implementation
//! that provides word access plus the two swap primitives, `evict` and
//! `restore`. [`EmulatedMemory`](crate::EmulatedMemory) is the in-process
//! implementation used by the simulator and the tests.

use crate::{FrameNumber, Geometry, PageNumber, PhysicalAddress};

/// The content of one memory cell. Table cells hold frame numbers, data cells
/// hold whatever the program wrote.
pub type Word = u64;

/// Physical memory as seen by the table walker.
///
/// Implementations may assume every address passed to them is below the
/// `RAM_SIZE` of the geometry they were built for; the engine asserts this
/// before calling.
pub trait PhysicalMemory {
    /// Reads the word at `address`.
    fn read(&self, address: PhysicalAddress) -> Word;

    /// Writes `value` to `address`.
    fn write(&mut self, address: PhysicalAddress, value: Word);

    /// Persists the content of `frame` to secondary storage under `page`.
    ///
    /// Called exactly once for every evicted data frame, before it is cleared.
    fn evict(&mut self, frame: FrameNumber, page: PageNumber);

    /// Loads the content previously evicted for `page` into `frame`.
    ///
    /// Called once whenever a data frame is materialized for `page`. Must be a
    /// no-op if `page` was never evicted.
    fn restore(&mut self, frame: FrameNumber, page: PageNumber);

    /// Zero-fills `frame`.
    fn clear_frame(&mut self, geometry: &Geometry, frame: FrameNumber) {
        for index in 0..geometry.frame_size() {
            self.write(geometry.cell(frame, index), 0);
        }
    }

    /// Returns true if every cell of `frame` is zero.
    fn is_frame_empty(&self, geometry: &Geometry, frame: FrameNumber) -> bool {
        (0..geometry.frame_size()).all(|index| self.read(geometry.cell(frame, index)) == 0)
    }
}
