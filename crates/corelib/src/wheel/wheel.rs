//! Wheel of member virtual nodes.

use crate::hash::HashFunction;
use crate::node::Address;
use crate::wheel::{segment_anchor, VirtualNode};

/// Upper bound on the virtual nodes any single member receives, whatever its
/// capacity factor.
pub const MAX_VNODES_PER_MEMBER: usize = 1 << 16;

/// Sorted virtual nodes of a member list.
///
/// Built once per factory call from `(members, capacity factors, seed)`;
/// identical inputs always produce an identical wheel.
#[derive(Debug, Clone)]
pub struct Wheel {
    vnodes: Vec<VirtualNode>,
    num_members: usize,
    num_segments: usize,
}

impl Wheel {
    /// Place `max(1, round(vnodes_per_unit * weight))` virtual nodes per
    /// member, capped at [`MAX_VNODES_PER_MEMBER`].
    ///
    /// `weights[i]` is the capacity factor of `members[i]`.
    pub fn new(
        hash: &dyn HashFunction,
        seed: u64,
        members: &[Address],
        weights: &[f64],
        vnodes_per_unit: usize,
        num_segments: usize,
    ) -> Self {
        debug_assert_eq!(members.len(), weights.len());

        let mut vnodes = Vec::new();
        for (member, (address, weight)) in members.iter().zip(weights).enumerate() {
            let count = vnode_count(vnodes_per_unit, *weight);
            vnodes.extend((0..count).map(|index| {
                VirtualNode::from_index(hash, seed, address.id, member, index as u32)
            }));
        }
        vnodes.sort_unstable();

        Self {
            vnodes,
            num_members: members.len(),
            num_segments,
        }
    }

    pub fn vnodes(&self) -> &[VirtualNode] {
        &self.vnodes
    }

    pub fn num_members(&self) -> usize {
        self.num_members
    }

    /// Members in clockwise order from the segment's anchor, each once.
    pub fn candidates(&self, segment: usize) -> Candidates<'_> {
        let anchor = segment_anchor(segment, self.num_segments);
        let start = self.vnodes.partition_point(|v| v.position < anchor);
        Candidates {
            vnodes: &self.vnodes,
            start,
            step: 0,
            seen: vec![false; self.num_members],
            remaining: self.num_members,
        }
    }

    /// Rank of every member in the segment's clockwise order
    /// (`rank[member]`, lower is earlier).
    pub fn wheel_rank(&self, segment: usize) -> Vec<usize> {
        let mut rank = vec![usize::MAX; self.num_members];
        for (order, member) in self.candidates(segment).enumerate() {
            rank[member] = order;
        }
        rank
    }
}

/// Number of virtual nodes a member of the given weight receives. Always in
/// `1..=MAX_VNODES_PER_MEMBER`.
pub fn vnode_count(vnodes_per_unit: usize, weight: f64) -> usize {
    let count = ((vnodes_per_unit as f64) * weight).round();
    if count.is_nan() {
        return 1;
    }
    count.clamp(1.0, MAX_VNODES_PER_MEMBER as f64) as usize
}

/// Iterator over distinct member indices, clockwise.
#[derive(Debug)]
pub struct Candidates<'a> {
    vnodes: &'a [VirtualNode],
    start: usize,
    step: usize,
    seen: Vec<bool>,
    remaining: usize,
}

impl Iterator for Candidates<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.remaining > 0 && self.step < self.vnodes.len() {
            let vnode = self.vnodes[(self.start + self.step) % self.vnodes.len()];
            self.step += 1;
            if !self.seen[vnode.member] {
                self.seen[vnode.member] = true;
                self.remaining -= 1;
                return Some(vnode.member);
            }
        }
        None
    }
}
