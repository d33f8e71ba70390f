//! Placement preference policies.
//!
//! A policy ranks how well a candidate owner spreads a segment's replicas
//! across failure domains. The factories consult it whenever they pick an
//! owner; the wheel order and load only break ties between equally ranked
//! candidates.

use std::fmt::Debug;

use corelib::{Address, TopologyInfo, TopologyLevel};

/// Ranks candidate owners for a segment.
pub trait PlacementPolicy: Send + Sync + Debug {
    /// Rank `candidate` against the owners already `chosen` for a segment.
    ///
    /// Higher is better. With no chosen owners every candidate must rank
    /// [`TopologyLevel::Site`].
    fn rank(&self, chosen: &[&Address], candidate: &Address) -> TopologyLevel;

    fn name(&self) -> &'static str;
}

/// No preference: every candidate ranks the same.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyPlacement;

impl PlacementPolicy for AnyPlacement {
    fn rank(&self, _chosen: &[&Address], _candidate: &Address) -> TopologyLevel {
        TopologyLevel::Site
    }

    fn name(&self) -> &'static str {
        "any"
    }
}

/// Prefer candidates in a different site, then rack, then machine from all
/// chosen owners.
///
/// The rank is the coarsest level at which the candidate differs from *every*
/// chosen owner. Nodes without topology information never differ.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopologyAwarePlacement;

impl PlacementPolicy for TopologyAwarePlacement {
    fn rank(&self, chosen: &[&Address], candidate: &Address) -> TopologyLevel {
        chosen
            .iter()
            .map(|owner| TopologyInfo::distance(owner.topology(), candidate.topology()))
            .min()
            .unwrap_or(TopologyLevel::Site)
    }

    fn name(&self) -> &'static str {
        "topology-aware"
    }
}
