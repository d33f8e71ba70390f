//! The hash wheel.
//!
//! A circular space of `2^31` positions. Segments are evenly spaced arcs of
//! the wheel; members contribute virtual nodes at hashed positions. Walking
//! clockwise from a segment's anchor yields the members in preference order
//! for that segment.

pub mod vnode;
pub mod wheel;

pub use vnode::VirtualNode;
pub use wheel::{Candidates, Wheel, MAX_VNODES_PER_MEMBER};

/// Number of bits in a wheel position.
pub const WHEEL_BITS: u32 = 31;

/// Number of positions on the wheel.
pub const WHEEL_SIZE: u64 = 1 << WHEEL_BITS;

/// Mask that maps any 32-bit hash onto the wheel (the unsigned 31-bit range).
pub const WHEEL_MASK: u32 = (WHEEL_SIZE - 1) as u32;

/// Width of one segment's arc: `ceil(2^31 / num_segments)`.
#[inline]
pub fn segment_size(num_segments: usize) -> u64 {
    WHEEL_SIZE.div_ceil(num_segments.max(1) as u64)
}

/// Segment owning the wheel position of `hash`. Always `< num_segments`.
#[inline]
pub fn segment_for_hash(hash: u32, num_segments: usize) -> usize {
    ((hash & WHEEL_MASK) as u64 / segment_size(num_segments)) as usize
}

/// First wheel position of a segment's arc.
#[inline]
pub fn segment_anchor(segment: usize, num_segments: usize) -> u32 {
    (segment as u64 * segment_size(num_segments)).min(WHEEL_SIZE - 1) as u32
}
