//! The consistent hash: an immutable segment → owners mapping.
//!
//! A `ConsistentHash` is produced by a factory and never mutated. Every
//! membership or balance change produces a new value; older values stay valid
//! snapshots for in-flight readers. All queries are pure and safe to call
//! from any number of threads without locking.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::config::validate_counts;
use crate::error::{Error, Result};
use crate::node::{Address, NodeId};
use crate::wheel::segment_for_hash;

/// Capacity factor per node identity. Missing nodes weigh `1.0`.
pub type CapacityFactors = HashMap<NodeId, f64>;

/// Capacity factor of a node with no explicit entry.
pub const DEFAULT_CAPACITY_FACTOR: f64 = 1.0;

/// Segment ownership for a fixed member list.
///
/// # Invariants
///
/// - `segment_owners.len() == num_segments`
/// - owners of a segment are distinct members, at most `num_owners` of them;
///   the first is the primary owner
/// - a fully replicated hash has exactly `min(num_owners, members.len())`
///   owners per segment; a hash fresh out of `update_members` may have fewer
#[derive(Clone, Debug, PartialEq)]
pub struct ConsistentHash {
    num_owners: usize,
    num_segments: usize,
    members: Vec<Address>,
    member_index: HashMap<NodeId, usize>,
    capacity_factors: Option<Vec<f64>>,
    segment_owners: Vec<Vec<Address>>,
}

impl ConsistentHash {
    /// Build and validate a consistent hash from owner addresses.
    ///
    /// Owners are normalised to the member entries with the same identity,
    /// so topology information always comes from `members`.
    pub fn new(
        num_owners: usize,
        num_segments: usize,
        members: Vec<Address>,
        capacity_factors: Option<&CapacityFactors>,
        segment_owners: Vec<Vec<Address>>,
    ) -> Result<Self> {
        let member_index = index_members(&members)?;
        let owners = segment_owners
            .iter()
            .map(|owners| {
                owners
                    .iter()
                    .map(|owner| {
                        member_index.get(&owner.id).copied().ok_or_else(|| {
                            Error::argument(format!("owner {owner} is not a member"))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let weights = resolve_capacity_factors(&members, &member_index, capacity_factors)?;
        Self::from_member_indices(num_owners, num_segments, members, weights, owners)
    }

    /// A hash where no segment has an owner yet.
    pub fn empty(
        num_owners: usize,
        num_segments: usize,
        members: Vec<Address>,
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<Self> {
        validate_counts(num_owners, num_segments)?;
        Self::new(
            num_owners,
            num_segments,
            members,
            capacity_factors,
            vec![Vec::new(); num_segments],
        )
    }

    /// Build from owner indices into `members`.
    ///
    /// `capacity_factors`, when present, is aligned with `members`.
    pub fn from_member_indices(
        num_owners: usize,
        num_segments: usize,
        members: Vec<Address>,
        capacity_factors: Option<Vec<f64>>,
        owners: Vec<Vec<usize>>,
    ) -> Result<Self> {
        validate_counts(num_owners, num_segments)?;
        let member_index = index_members(&members)?;

        if let Some(weights) = &capacity_factors {
            if weights.len() != members.len() {
                return Err(Error::argument(format!(
                    "{} capacity factors for {} members",
                    weights.len(),
                    members.len()
                )));
            }
            for (member, weight) in members.iter().zip(weights) {
                check_weight(member, *weight)?;
            }
        }

        if owners.len() != num_segments {
            return Err(Error::argument(format!(
                "owners given for {} segments, expected {num_segments}",
                owners.len()
            )));
        }

        let mut segment_owners = Vec::with_capacity(num_segments);
        for (segment, indices) in owners.into_iter().enumerate() {
            if indices.len() > num_owners {
                return Err(Error::argument(format!(
                    "segment {segment} has {} owners, num_owners is {num_owners}",
                    indices.len()
                )));
            }
            let mut seen = HashSet::with_capacity(indices.len());
            let mut list = Vec::with_capacity(indices.len());
            for index in indices {
                let member = members.get(index).ok_or_else(|| {
                    Error::argument(format!("segment {segment} owner index {index} out of range"))
                })?;
                if !seen.insert(index) {
                    return Err(Error::argument(format!(
                        "segment {segment} lists owner {member} twice"
                    )));
                }
                list.push(member.clone());
            }
            segment_owners.push(list);
        }

        Ok(Self {
            num_owners,
            num_segments,
            members,
            member_index,
            capacity_factors,
            segment_owners,
        })
    }

    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    pub fn num_owners(&self) -> usize {
        self.num_owners
    }

    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn is_member(&self, node: &Address) -> bool {
        self.member_index.contains_key(&node.id)
    }

    /// Position of `node` in the member list.
    pub fn member_index(&self, node: &Address) -> Option<usize> {
        self.member_index.get(&node.id).copied()
    }

    /// Target owner count per segment: `min(num_owners, members.len())`.
    pub fn expected_owners(&self) -> usize {
        self.num_owners.min(self.members.len())
    }

    /// Explicit capacity factors, aligned with [`members`](Self::members).
    pub fn capacity_factors(&self) -> Option<&[f64]> {
        self.capacity_factors.as_deref()
    }

    /// Capacity factors as a map, suitable for feeding back into a factory.
    pub fn capacity_factor_map(&self) -> Option<CapacityFactors> {
        self.capacity_factors.as_ref().map(|weights| {
            self.members
                .iter()
                .zip(weights)
                .map(|(member, weight)| (member.id, *weight))
                .collect()
        })
    }

    pub fn capacity_factor(&self, node: &Address) -> Result<f64> {
        let index = self
            .member_index(node)
            .ok_or_else(|| Error::argument(format!("{node} is not a member")))?;
        Ok(self.weight(index))
    }

    /// Capacity factor of every member, defaulting to `1.0`.
    pub fn weights(&self) -> Vec<f64> {
        (0..self.members.len()).map(|i| self.weight(i)).collect()
    }

    fn weight(&self, index: usize) -> f64 {
        self.capacity_factors
            .as_ref()
            .map_or(DEFAULT_CAPACITY_FACTOR, |weights| weights[index])
    }

    fn check_segment(&self, segment: usize) -> Result<()> {
        if segment >= self.num_segments {
            return Err(Error::InvalidSegment {
                segment,
                num_segments: self.num_segments,
            });
        }
        Ok(())
    }

    /// The primary owner of `segment`, `None` when the segment has no owner.
    pub fn locate_primary_owner(&self, segment: usize) -> Result<Option<&Address>> {
        self.check_segment(segment)?;
        Ok(self.segment_owners[segment].first())
    }

    /// All owners of `segment`, primary first.
    pub fn locate_owners(&self, segment: usize) -> Result<&[Address]> {
        self.check_segment(segment)?;
        Ok(&self.segment_owners[segment])
    }

    /// Every segment `node` owns; empty for unknown nodes.
    pub fn segments_for_owner(&self, node: &Address) -> BTreeSet<usize> {
        if !self.is_member(node) {
            return BTreeSet::new();
        }
        self.segment_owners
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.contains(node))
            .map(|(segment, _)| segment)
            .collect()
    }

    /// Segments where `node` is the primary owner.
    pub fn primary_segments_for_owner(&self, node: &Address) -> BTreeSet<usize> {
        self.segment_owners
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.first() == Some(node))
            .map(|(segment, _)| segment)
            .collect()
    }

    /// Segment of a 32-bit key hash. The sign bit is ignored, so every
    /// member maps a hash to the same segment.
    pub fn segment_for_key(&self, key_hash: u32) -> usize {
        segment_for_hash(key_hash, self.num_segments)
    }

    pub fn locate_owners_for_key(&self, key_hash: u32) -> &[Address] {
        &self.segment_owners[self.segment_for_key(key_hash)]
    }

    pub fn locate_primary_owner_for_key(&self, key_hash: u32) -> Option<&Address> {
        self.locate_owners_for_key(key_hash).first()
    }

    /// Owner lists of all segments, in segment order.
    pub fn segment_owners(&self) -> &[Vec<Address>] {
        &self.segment_owners
    }

    /// Owner lists as member indices.
    pub fn segment_owner_indices(&self) -> Vec<Vec<usize>> {
        self.segment_owners
            .iter()
            .map(|owners| owners.iter().map(|o| self.member_index[&o.id]).collect())
            .collect()
    }

    /// Segments with fewer than [`expected_owners`](Self::expected_owners) owners.
    pub fn under_replicated_segments(&self) -> Vec<usize> {
        let expected = self.expected_owners();
        self.segment_owners
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.len() < expected)
            .map(|(segment, _)| segment)
            .collect()
    }

    pub fn is_fully_replicated(&self) -> bool {
        let expected = self.expected_owners();
        self.segment_owners.iter().all(|owners| owners.len() == expected)
    }
}

impl fmt::Display for ConsistentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ConsistentHash(segments={}, owners={}, members={})",
            self.num_segments,
            self.num_owners,
            self.members.len()
        )?;
        for (segment, owners) in self.segment_owners.iter().enumerate() {
            let names: Vec<&str> = owners.iter().map(|o| &*o.name).collect();
            writeln!(f, "  {segment:>5}: [{}]", names.join(", "))?;
        }
        Ok(())
    }
}

fn index_members(members: &[Address]) -> Result<HashMap<NodeId, usize>> {
    let mut index = HashMap::with_capacity(members.len());
    for (i, member) in members.iter().enumerate() {
        if index.insert(member.id, i).is_some() {
            return Err(Error::argument(format!("duplicate member {member}")));
        }
    }
    Ok(index)
}

fn check_weight(member: &Address, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(Error::argument(format!(
            "capacity factor of {member} must be positive, got {weight}"
        )));
    }
    Ok(())
}

/// Align a capacity factor map with a member list.
///
/// Entries for nodes outside `members` are rejected rather than ignored.
pub(crate) fn resolve_capacity_factors(
    members: &[Address],
    member_index: &HashMap<NodeId, usize>,
    capacity_factors: Option<&CapacityFactors>,
) -> Result<Option<Vec<f64>>> {
    let Some(factors) = capacity_factors else {
        return Ok(None);
    };
    let mut weights = vec![DEFAULT_CAPACITY_FACTOR; members.len()];
    for (id, weight) in factors {
        let index = *member_index
            .get(id)
            .ok_or_else(|| Error::argument(format!("capacity factor for non-member {id}")))?;
        check_weight(&members[index], *weight)?;
        weights[index] = *weight;
    }
    Ok(Some(weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyInfo;

    fn nodes(n: usize) -> Vec<Address> {
        (0..n).map(|i| Address::named(&format!("n{i}"))).collect()
    }

    fn sample() -> ConsistentHash {
        let m = nodes(3);
        ConsistentHash::new(
            2,
            4,
            m.clone(),
            None,
            vec![
                vec![m[0].clone(), m[1].clone()],
                vec![m[1].clone(), m[2].clone()],
                vec![m[2].clone(), m[0].clone()],
                vec![m[0].clone(), m[2].clone()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_locate() {
        let ch = sample();
        let m = nodes(3);
        assert_eq!(ch.locate_primary_owner(1).unwrap(), Some(&m[1]));
        assert_eq!(ch.locate_owners(2).unwrap(), &[m[2].clone(), m[0].clone()]);
        assert_eq!(
            ch.segments_for_owner(&m[0]).into_iter().collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        assert_eq!(
            ch.primary_segments_for_owner(&m[0]).into_iter().collect::<Vec<_>>(),
            vec![0, 3]
        );
        assert!(ch.is_fully_replicated());
    }

    #[test]
    fn test_invalid_segment() {
        let ch = sample();
        assert_eq!(
            ch.locate_owners(4),
            Err(Error::InvalidSegment {
                segment: 4,
                num_segments: 4
            })
        );
        assert!(ch.locate_primary_owner(100).is_err());
    }

    #[test]
    fn test_unknown_owner_has_no_segments() {
        assert!(sample().segments_for_owner(&Address::named("ghost")).is_empty());
    }

    #[test]
    fn test_rejects_duplicates_and_strangers() {
        let m = nodes(2);
        let dup_members = ConsistentHash::empty(1, 2, vec![m[0].clone(), m[0].clone()], None);
        assert!(matches!(dup_members, Err(Error::InvalidArgument(_))));

        let dup_owner = ConsistentHash::new(
            2,
            1,
            m.clone(),
            None,
            vec![vec![m[0].clone(), m[0].clone()]],
        );
        assert!(matches!(dup_owner, Err(Error::InvalidArgument(_))));

        let stranger = ConsistentHash::new(
            2,
            1,
            m.clone(),
            None,
            vec![vec![Address::named("ghost")]],
        );
        assert!(matches!(stranger, Err(Error::InvalidArgument(_))));

        let too_many = ConsistentHash::new(1, 1, m.clone(), None, vec![m.clone()]);
        assert!(matches!(too_many, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_zero_counts_are_configuration_errors() {
        assert!(matches!(
            ConsistentHash::empty(0, 4, nodes(2), None),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ConsistentHash::empty(2, 0, nodes(2), None),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_capacity_factors() {
        let m = nodes(2);
        let mut factors = CapacityFactors::new();
        factors.insert(m[1].id, 2.0);
        let ch = ConsistentHash::empty(1, 4, m.clone(), Some(&factors)).unwrap();
        assert_eq!(ch.capacity_factor(&m[0]).unwrap(), 1.0);
        assert_eq!(ch.capacity_factor(&m[1]).unwrap(), 2.0);
        assert_eq!(ch.weights(), vec![1.0, 2.0]);
        assert!(ch.capacity_factor(&Address::named("ghost")).is_err());
        assert_eq!(ch.capacity_factor_map().unwrap()[&m[1].id], 2.0);

        factors.insert(m[0].id, 0.0);
        assert!(ConsistentHash::empty(1, 4, m.clone(), Some(&factors)).is_err());

        let mut stranger = CapacityFactors::new();
        stranger.insert(NodeId(42), 1.0);
        assert!(ConsistentHash::empty(1, 4, m, Some(&stranger)).is_err());
    }

    #[test]
    fn test_owners_take_member_topology() {
        let member = Address::named("n0").with_topology(TopologyInfo::parse("s1/r0/m0"));
        let bare = Address::named("n0");
        let ch = ConsistentHash::new(1, 1, vec![member], None, vec![vec![bare]]).unwrap();
        let owner = ch.locate_primary_owner(0).unwrap().unwrap();
        assert!(owner.topology().is_some());
    }

    #[test]
    fn test_empty_membership_has_no_owners() {
        let ch = ConsistentHash::empty(2, 8, Vec::new(), None).unwrap();
        assert_eq!(ch.expected_owners(), 0);
        assert!(ch.is_fully_replicated());
        assert_eq!(ch.locate_primary_owner(3).unwrap(), None);
        assert!(ch.locate_owners_for_key(0xdead_beef).is_empty());
    }

    #[test]
    fn test_under_replicated_segments() {
        let m = nodes(3);
        let ch = ConsistentHash::new(
            2,
            2,
            m.clone(),
            None,
            vec![vec![m[0].clone()], vec![m[1].clone(), m[2].clone()]],
        )
        .unwrap();
        assert_eq!(ch.under_replicated_segments(), vec![0]);
        assert!(!ch.is_fully_replicated());
    }
}
