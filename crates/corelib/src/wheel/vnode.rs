//! Virtual node abstractions.
//!
//! Instead of each member having a single position on the wheel, each member
//! has several (virtual nodes). This provides:
//!
//! 1. **Better load distribution**: more positions = smoother spread of segments
//! 2. **Capacity weighting**: a member with capacity factor 2.0 gets twice the
//!    positions, and so is first clockwise for roughly twice the segments
//! 3. **Gradual change**: a departing member's segments fall to many
//!    different successors instead of one neighbour

use crate::hash::HashFunction;
use crate::node::NodeId;
use crate::wheel::WHEEL_MASK;

/// A virtual node on the wheel.
///
/// # Invariants
///
/// - Every `VirtualNode` belongs to exactly one member (by index into the
///   member list the wheel was built from)
/// - Ordering is by position first, then member index, then vnode index,
///   so colliding positions still sort identically everywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualNode {
    /// Position on the wheel, in `[0, 2^31)`.
    pub position: u32,

    /// Index of the owning member.
    pub member: usize,

    /// Index of this vnode among the member's vnodes (0, 1, 2, ...).
    pub index: u32,
}

impl VirtualNode {
    #[inline]
    pub fn new(position: u32, member: usize, index: u32) -> Self {
        Self {
            position,
            member,
            index,
        }
    }

    /// Create a virtual node by hashing `seed ++ node_id ++ vnode_index`.
    ///
    /// With a fixed seed this depends only on the node identity, so every
    /// process derives the same position.
    ///
    /// # Example
    /// ```rust
    /// use corelib::hash::Sip13Hash;
    /// use corelib::wheel::VirtualNode;
    /// use corelib::NodeId;
    ///
    /// let v0 = VirtualNode::from_index(&Sip13Hash, 0, NodeId(1), 0, 0);
    /// let again = VirtualNode::from_index(&Sip13Hash, 0, NodeId(1), 0, 0);
    /// assert_eq!(v0, again);
    /// ```
    pub fn from_index(
        hash: &dyn HashFunction,
        seed: u64,
        node_id: NodeId,
        member: usize,
        index: u32,
    ) -> Self {
        let mut key = [0u8; 28];
        key[..8].copy_from_slice(&seed.to_le_bytes());
        key[8..24].copy_from_slice(&node_id.to_bytes());
        key[24..].copy_from_slice(&index.to_le_bytes());

        Self::new(hash.hash(&key) & WHEEL_MASK, member, index)
    }
}

impl std::fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VNode(pos={:08x}, member={}, index={})",
            self.position, self.member, self.index
        )
    }
}
