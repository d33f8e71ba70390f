//! Tests for the consistent hash value, its snapshot and statistics.
//!
//! # Test Strategy
//!
//! 1. **Construction**: invariants enforced by the constructor
//! 2. **Queries**: owners, segments and key lookup
//! 3. **Statistics**: owned counts and ratios
//! 4. **Snapshot**: rebuilt hashes answer every query identically
//! 5. **Wheel**: candidate order is complete and reproducible

use std::collections::{BTreeSet, HashMap};

use corelib::hash::{Sip13Hash, Xxh3Hash};
use corelib::wheel::{segment_anchor, segment_size};
use corelib::{
    Address, CapacityFactors, ConsistentHash, ConsistentHashSnapshot, Error, HashFunction,
    OwnershipStatistics, TopologyInfo, Wheel,
};
use proptest::prelude::*;

fn nodes(n: usize) -> Vec<Address> {
    (0..n)
        .map(|i| {
            Address::named(&format!("n{i}"))
                .with_topology(TopologyInfo::parse(&format!("s1/r{}/m{i}", i % 2)))
        })
        .collect()
}

/// Owners `[i % n, (i + 1) % n]` for every segment.
fn striped(num_segments: usize, n: usize) -> ConsistentHash {
    let owners = (0..num_segments).map(|s| vec![s % n, (s + 1) % n]).collect();
    ConsistentHash::from_member_indices(2, num_segments, nodes(n), None, owners).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_empty_hash_has_no_owners() {
    let ch = ConsistentHash::empty(2, 8, nodes(3), None).unwrap();
    assert_eq!(ch.num_segments(), 8);
    assert_eq!(ch.expected_owners(), 2);
    assert_eq!(ch.under_replicated_segments().len(), 8);
    assert!(!ch.is_fully_replicated());
    assert_eq!(ch.locate_primary_owner(0).unwrap(), None);
}

#[test]
fn test_zero_counts_are_configuration_errors() {
    assert!(matches!(
        ConsistentHash::empty(0, 8, nodes(2), None),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        ConsistentHash::empty(2, 0, nodes(2), None),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn test_constructor_rejects_broken_owner_lists() {
    let members = nodes(3);
    // Too many owners.
    let err = ConsistentHash::from_member_indices(1, 1, members.clone(), None, vec![vec![0, 1]]);
    assert!(matches!(err, Err(Error::InvalidArgument(_))));
    // Same owner twice.
    let err = ConsistentHash::from_member_indices(2, 1, members.clone(), None, vec![vec![1, 1]]);
    assert!(matches!(err, Err(Error::InvalidArgument(_))));
    // Owner outside the member list.
    let err = ConsistentHash::new(
        2,
        1,
        members.clone(),
        None,
        vec![vec![Address::named("stranger")]],
    );
    assert!(matches!(err, Err(Error::InvalidArgument(_))));
    // Wrong number of segments.
    let err = ConsistentHash::from_member_indices(2, 2, members, None, vec![vec![0]]);
    assert!(matches!(err, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_duplicate_members_rejected() {
    let mut members = nodes(2);
    members.push(members[0].clone());
    assert!(matches!(
        ConsistentHash::empty(1, 4, members, None),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_capacity_factors_must_be_positive() {
    let members = nodes(2);
    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let factors: CapacityFactors = HashMap::from([(members[0].id, bad)]);
        assert!(
            ConsistentHash::empty(1, 4, members.clone(), Some(&factors)).is_err(),
            "{bad}"
        );
    }
    let factors: CapacityFactors = HashMap::from([(members[1].id, 2.5)]);
    let ch = ConsistentHash::empty(1, 4, members.clone(), Some(&factors)).unwrap();
    assert_eq!(ch.capacity_factor(&members[0]).unwrap(), 1.0);
    assert_eq!(ch.capacity_factor(&members[1]).unwrap(), 2.5);
    assert_eq!(ch.weights(), vec![1.0, 2.5]);
}

#[test]
fn test_owner_topology_comes_from_members() {
    let members = nodes(2);
    let bare = Address::new(members[1].id, "renamed");
    let ch = ConsistentHash::new(2, 1, members.clone(), None, vec![vec![bare]]).unwrap();
    let owner = &ch.locate_owners(0).unwrap()[0];
    assert_eq!(&*owner.name, "n1");
    assert_eq!(owner.topology(), members[1].topology());
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_locate_owners_and_primary() {
    let ch = striped(6, 3);
    assert_eq!(ch.locate_owners(4).unwrap(), &[nodes(3)[1].clone(), nodes(3)[2].clone()]);
    assert_eq!(ch.locate_primary_owner(4).unwrap(), Some(&nodes(3)[1]));
    assert!(ch.is_fully_replicated());
}

#[test]
fn test_out_of_range_segment() {
    let ch = striped(6, 3);
    assert_eq!(
        ch.locate_owners(6).unwrap_err(),
        Error::InvalidSegment {
            segment: 6,
            num_segments: 6
        }
    );
    assert!(ch.locate_primary_owner(100).is_err());
}

#[test]
fn test_segments_for_owner() {
    let ch = striped(6, 3);
    let n0 = &nodes(3)[0];
    assert_eq!(ch.segments_for_owner(n0), BTreeSet::from([0, 2, 3, 5]));
    assert_eq!(ch.primary_segments_for_owner(n0), BTreeSet::from([0, 3]));
    assert!(ch.segments_for_owner(&Address::named("ghost")).is_empty());
}

#[test]
fn test_key_lookup_uses_segment_arcs() {
    let ch = striped(60, 4);
    let size = segment_size(60) as u32;
    for segment in [0usize, 1, 30, 59] {
        let anchor = segment_anchor(segment, 60);
        assert_eq!(anchor, segment as u32 * size);
        assert_eq!(ch.segment_for_key(anchor), segment);
        // The sign bit does not change the segment.
        assert_eq!(ch.segment_for_key(anchor | 0x8000_0000), segment);
        assert_eq!(
            ch.locate_owners_for_key(anchor),
            ch.locate_owners(segment).unwrap()
        );
    }
    assert_eq!(ch.segment_for_key(u32::MAX), 59);
    assert_eq!(
        ch.locate_primary_owner_for_key(0),
        ch.locate_primary_owner(0).unwrap()
    );
}

#[test]
fn test_display_lists_segments() {
    let text = striped(3, 3).to_string();
    assert!(text.starts_with("ConsistentHash(segments=3, owners=2, members=3)"));
    assert!(text.contains("[n2, n0]"));
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn test_statistics_conserve_assignments() {
    let ch = striped(60, 4);
    let stats = OwnershipStatistics::new(&ch);
    assert_eq!(stats.sum_owned(), 120);
    assert_eq!(stats.sum_primary_owned(), 60);
    assert_eq!(stats.owned_counts(), &[30, 30, 30, 30]);
    assert_eq!(stats.owned_ratio(), 1.0);
    for node in nodes(4) {
        assert_eq!(stats.primary_owned(&node).unwrap(), 15);
    }
}

#[test]
fn test_statistics_for_explicit_nodes() {
    let ch = striped(6, 3);
    let outsider = Address::named("idle");
    let tracked = vec![nodes(3)[0].clone(), outsider.clone()];
    let stats = OwnershipStatistics::with_nodes(&ch, &tracked);
    assert_eq!(stats.owned(&outsider).unwrap(), 0);
    assert_eq!(stats.owned_ratio(), f64::INFINITY);
    assert!(matches!(
        stats.owned(&nodes(3)[1]),
        Err(Error::InvalidArgument(_))
    ));
}

// ============================================================================
// Snapshot
// ============================================================================

#[test]
fn test_snapshot_preserves_queries() {
    let members = nodes(4);
    let factors: CapacityFactors = members.iter().map(|m| (m.id, 1.5)).collect();
    let owners = (0..16).map(|s| vec![s % 4, (s + 3) % 4]).collect::<Vec<_>>();
    let ch = ConsistentHash::from_member_indices(
        2,
        16,
        members.clone(),
        Some(vec![1.5; 4]),
        owners,
    )
    .unwrap();
    assert_eq!(ch.capacity_factor_map(), Some(factors));

    let json = serde_json::to_string(&ch.to_snapshot()).unwrap();
    let snapshot: ConsistentHashSnapshot = serde_json::from_str(&json).unwrap();
    let rebuilt = ConsistentHash::from_snapshot(&snapshot).unwrap();

    assert_eq!(rebuilt, ch);
    for member in &members {
        assert_eq!(rebuilt.segments_for_owner(member), ch.segments_for_owner(member));
        assert_eq!(rebuilt.member_index(member), ch.member_index(member));
        assert_eq!(rebuilt.members()[ch.member_index(member).unwrap()].topology(), member.topology());
    }
}

#[test]
fn test_snapshot_rejects_bad_indices() {
    let mut snapshot = striped(4, 2).to_snapshot();
    snapshot.segment_owners[1] = vec![0, 7];
    assert!(matches!(
        ConsistentHash::from_snapshot(&snapshot),
        Err(Error::InvalidArgument(_))
    ));

    let mut snapshot = striped(4, 2).to_snapshot();
    snapshot.members[0].capacity_factor = Some(2.0);
    assert!(ConsistentHash::from_snapshot(&snapshot).is_err());
}

// ============================================================================
// Wheel
// ============================================================================

#[test]
fn test_wheel_candidates_visit_every_member_once() {
    let members = nodes(5);
    let wheel = Wheel::new(&Sip13Hash, 0, &members, &[1.0; 5], 16, 60);
    assert_eq!(wheel.vnodes().len(), 80);
    for segment in [0, 17, 59] {
        let order: Vec<usize> = wheel.candidates(segment).collect();
        assert_eq!(order.len(), 5);
        assert_eq!(order.iter().collect::<BTreeSet<_>>().len(), 5);
    }
}

#[test]
fn test_wheel_depends_on_seed_and_hash() {
    let members = nodes(8);
    let weights = [1.0; 8];
    let a = Wheel::new(&Sip13Hash, 0, &members, &weights, 8, 32);
    let b = Wheel::new(&Sip13Hash, 0, &members, &weights, 8, 32);
    let reseeded = Wheel::new(&Sip13Hash, 7, &members, &weights, 8, 32);
    let rehashed = Wheel::new(&Xxh3Hash, 0, &members, &weights, 8, 32);
    assert_eq!(a.vnodes(), b.vnodes());
    assert_ne!(a.vnodes(), reseeded.vnodes());
    assert_ne!(a.vnodes(), rehashed.vnodes());
}

#[test]
fn test_wheel_weights_scale_vnodes() {
    let members = nodes(3);
    let wheel = Wheel::new(&Sip13Hash, 0, &members, &[1.0, 2.0, 0.001], 10, 8);
    let count = |m: usize| wheel.vnodes().iter().filter(|v| v.member == m).count();
    assert_eq!(count(0), 10);
    assert_eq!(count(1), 20);
    // Tiny weights still get one position.
    assert_eq!(count(2), 1);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_segment_for_key_in_range(num_segments in 1usize..5000, hash in any::<u32>()) {
        let ch = ConsistentHash::empty(1, num_segments, nodes(1), None).unwrap();
        prop_assert!(ch.segment_for_key(hash) < num_segments);
    }

    #[test]
    fn prop_snapshot_round_trip(num_segments in 1usize..64, n in 1usize..6, rotate in 0usize..6) {
        let k = n.min(2);
        let owners = (0..num_segments)
            .map(|s| (0..k).map(|j| (s + rotate + j) % n).collect())
            .collect();
        let ch = ConsistentHash::from_member_indices(2, num_segments, nodes(n), None, owners).unwrap();
        let rebuilt = ConsistentHash::from_snapshot(&ch.to_snapshot()).unwrap();
        prop_assert_eq!(rebuilt, ch);
    }

    #[test]
    fn prop_hash_providers_agree_with_themselves(key in proptest::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(Sip13Hash.hash(&key), Sip13Hash.hash(&key));
        prop_assert_eq!(Xxh3Hash.hash(&key), Xxh3Hash.hash(&key));
    }
}
