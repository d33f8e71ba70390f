//! Consistent hash factories.
//!
//! This crate decides which members own which segments:
//! - Building a consistent hash from a member list
//! - Adapting it cheaply when members join or leave
//! - Rebalancing it to full replication and even load
//! - Spreading replicas across failure domains
//!
//! The factories share one wheel placement engine and differ only in how the
//! wheel is seeded and which [`PlacementPolicy`] they apply.

pub mod balance;
pub mod distribution;
pub mod placement;
pub mod strategy;

pub use balance::{RebalanceSummary, Targets};
pub use distribution::{
    key_distribution, leave_join_cycles, CycleReport, CycleRun, Distribution,
    OwnershipDistribution,
};
pub use placement::{AnyPlacement, PlacementPolicy, TopologyAwarePlacement};
pub use strategy::{
    build_factory, ConsistentHashFactory, DefaultFactory, SyncFactory, TopologyAwareFactory,
    WheelStrategy,
};
