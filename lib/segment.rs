//! Byte-range descriptors shared by the read and write paths.

use std::fmt;

/// A byte range: up to `length` bytes starting at `offset`.
///
/// A segment never implies "the rest of the object". A zero-length segment is valid and
/// describes an empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Segment {
    /// First byte of the range.
    pub offset: u64,
    /// Number of bytes in the range.
    pub length: u64,
}

impl Segment {
    /// Creates a new segment.
    #[must_use]
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Returns the exclusive end of the range, or `None` if it would overflow `u64`.
    #[must_use]
    pub const fn checked_end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Returns the inclusive last byte of the range, or `None` for an empty or overflowing range.
    #[must_use]
    pub fn last_byte(&self) -> Option<u64> {
        if self.length == 0 {
            return None;
        }
        self.checked_end().map(|end| end - 1)
    }

    /// Whether the segment covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The segment's length as a `usize`, if it fits.
    #[must_use]
    pub fn len_usize(&self) -> Option<usize> {
        usize::try_from(self.length).ok()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}+{}]", self.offset, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_overflow_is_detected() {
        assert_eq!(Segment::new(u64::MAX, 1).checked_end(), None);
        assert_eq!(Segment::new(u64::MAX - 1, 1).checked_end(), Some(u64::MAX));
    }

    #[test]
    fn last_byte_of_empty_segment_is_none() {
        assert_eq!(Segment::new(10, 0).last_byte(), None);
        assert_eq!(Segment::new(10, 3).last_byte(), Some(12));
    }
}
