//! Consistent hash factories.
//!
//! A factory builds a [`ConsistentHash`] from scratch, adapts one to a
//! membership change, and rebalances one. All strategies share the wheel
//! placement in [`WheelStrategy`]; they differ only in how the wheel is
//! seeded and which [`PlacementPolicy`] ranks candidate owners:
//!
//! - **DefaultFactory**: wheel seeded per process
//! - **SyncFactory**: wheel derived from node identities alone, identical on
//!   every member
//! - **TopologyAwareFactory**: the sync wheel, diversifying replicas across
//!   sites, racks and machines

/// Implement [`ConsistentHashFactory`] for a strategy by forwarding every
/// call to its `inner` [`WheelStrategy`].
macro_rules! delegate_factory {
    ($factory:ty) => {
        impl $crate::strategy::ConsistentHashFactory for $factory {
            fn create(
                &self,
                num_owners: usize,
                num_segments: usize,
                members: &[corelib::Address],
                capacity_factors: Option<&corelib::CapacityFactors>,
            ) -> corelib::Result<corelib::ConsistentHash> {
                $crate::strategy::ConsistentHashFactory::create(
                    &self.inner,
                    num_owners,
                    num_segments,
                    members,
                    capacity_factors,
                )
            }

            fn update_members(
                &self,
                base: &corelib::ConsistentHash,
                new_members: &[corelib::Address],
                capacity_factors: Option<&corelib::CapacityFactors>,
            ) -> corelib::Result<corelib::ConsistentHash> {
                $crate::strategy::ConsistentHashFactory::update_members(
                    &self.inner,
                    base,
                    new_members,
                    capacity_factors,
                )
            }

            fn rebalance(
                &self,
                base: &corelib::ConsistentHash,
            ) -> corelib::Result<corelib::ConsistentHash> {
                $crate::strategy::ConsistentHashFactory::rebalance(&self.inner, base)
            }

            fn name(&self) -> &'static str {
                $crate::strategy::ConsistentHashFactory::name(&self.inner)
            }
        }
    };
}

pub mod default;
pub mod sync;
pub mod topology_aware;

pub use default::DefaultFactory;
pub use sync::SyncFactory;
pub use topology_aware::TopologyAwareFactory;

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use corelib::config::{validate_counts, DEFAULT_VNODES_PER_UNIT};
use corelib::{
    Address, CapacityFactors, ConsistentHash, Error, FactoryKind, HashConfig, HashFunction,
    NodeId, OwnershipStatistics, Result, Wheel,
};
use tracing::{debug, info};

use crate::balance::{wheel_owners, Rebalancer, Targets};
use crate::placement::PlacementPolicy;

/// Trait for consistent hash factories.
///
/// Implementations are stateless between calls and thread-safe; the same
/// inputs always produce the same output for a given factory instance.
pub trait ConsistentHashFactory: Send + Sync + Debug {
    /// Build a hash for `members` from scratch.
    ///
    /// Every segment gets `min(num_owners, members.len())` owners.
    fn create(
        &self,
        num_owners: usize,
        num_segments: usize,
        members: &[Address],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash>;

    /// Adapt `base` to a new member list without rebalancing.
    ///
    /// Owners that left are dropped, remaining owners keep their relative
    /// order and new members own nothing. The result may be
    /// under-replicated until [`rebalance`](Self::rebalance) runs.
    fn update_members(
        &self,
        base: &ConsistentHash,
        new_members: &[Address],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash>;

    /// Restore full replication and even out the load of `base`.
    ///
    /// Idempotent: rebalancing a rebalanced hash returns it unchanged.
    fn rebalance(&self, base: &ConsistentHash) -> Result<ConsistentHash>;

    /// Returns the strategy name (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// Build the factory selected by `config`.
pub fn build_factory(config: &HashConfig) -> Result<Box<dyn ConsistentHashFactory>> {
    config.validate()?;
    let hash = config.hash.build();
    Ok(match config.factory {
        FactoryKind::Default => Box::new(
            DefaultFactory::with_hash(hash).with_vnodes_per_unit(config.vnodes_per_unit),
        ),
        FactoryKind::Sync => {
            Box::new(SyncFactory::with_hash(hash).with_vnodes_per_unit(config.vnodes_per_unit))
        }
        FactoryKind::TopologyAware => Box::new(
            TopologyAwareFactory::with_hash(hash).with_vnodes_per_unit(config.vnodes_per_unit),
        ),
    })
}

/// Wheel placement shared by every strategy.
#[derive(Clone)]
pub struct WheelStrategy {
    name: &'static str,
    hash: Arc<dyn HashFunction>,
    seed: u64,
    vnodes_per_unit: usize,
    policy: Arc<dyn PlacementPolicy>,
}

impl Debug for WheelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WheelStrategy")
            .field("name", &self.name)
            .field("hash", &self.hash.name())
            .field("seed", &self.seed)
            .field("vnodes_per_unit", &self.vnodes_per_unit)
            .field("policy", &self.policy.name())
            .finish()
    }
}

impl WheelStrategy {
    pub fn new(
        name: &'static str,
        hash: Arc<dyn HashFunction>,
        seed: u64,
        policy: Arc<dyn PlacementPolicy>,
    ) -> Self {
        Self {
            name,
            hash,
            seed,
            vnodes_per_unit: DEFAULT_VNODES_PER_UNIT,
            policy,
        }
    }

    /// Virtual nodes per unit of capacity factor. Zero is treated as one.
    pub fn with_vnodes_per_unit(mut self, vnodes_per_unit: usize) -> Self {
        self.vnodes_per_unit = vnodes_per_unit.max(1);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn vnodes_per_unit(&self) -> usize {
        self.vnodes_per_unit
    }

    pub fn policy(&self) -> &dyn PlacementPolicy {
        self.policy.as_ref()
    }

    /// The wheel every placement decision for `ch` is made on.
    pub fn wheel(&self, ch: &ConsistentHash) -> Wheel {
        Wheel::new(
            self.hash.as_ref(),
            self.seed,
            ch.members(),
            &ch.weights(),
            self.vnodes_per_unit,
            ch.num_segments(),
        )
    }
}

impl ConsistentHashFactory for WheelStrategy {
    fn create(
        &self,
        num_owners: usize,
        num_segments: usize,
        members: &[Address],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash> {
        validate_counts(num_owners, num_segments)?;
        let empty = ConsistentHash::empty(
            num_owners,
            num_segments,
            members.to_vec(),
            capacity_factors,
        )?;

        let k = empty.expected_owners();
        let wheel = self.wheel(&empty);
        let owners: Vec<Vec<usize>> = (0..num_segments)
            .map(|segment| wheel_owners(&wheel, self.policy.as_ref(), members, segment, k))
            .collect();

        debug!(
            factory = self.name,
            num_segments,
            num_owners,
            members = members.len(),
            vnodes = wheel.vnodes().len(),
            "created consistent hash"
        );

        ConsistentHash::from_member_indices(
            num_owners,
            num_segments,
            members.to_vec(),
            empty.capacity_factors().map(<[f64]>::to_vec),
            owners,
        )
    }

    fn update_members(
        &self,
        base: &ConsistentHash,
        new_members: &[Address],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash> {
        validate_counts(base.num_owners(), base.num_segments())?;

        let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(new_members.len());
        for (i, member) in new_members.iter().enumerate() {
            if index.insert(member.id, i).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate member {member}"
                )));
            }
        }

        let owners: Vec<Vec<usize>> = base
            .segment_owners()
            .iter()
            .map(|owners| {
                owners
                    .iter()
                    .filter_map(|owner| index.get(&owner.id).copied())
                    .collect()
            })
            .collect();

        let updated = ConsistentHash::empty(
            base.num_owners(),
            base.num_segments(),
            new_members.to_vec(),
            capacity_factors,
        )?;
        let updated = ConsistentHash::from_member_indices(
            base.num_owners(),
            base.num_segments(),
            new_members.to_vec(),
            updated.capacity_factors().map(<[f64]>::to_vec),
            owners,
        )?;

        let left = base
            .members()
            .iter()
            .filter(|m| !index.contains_key(&m.id))
            .count();
        let joined = new_members.iter().filter(|m| !base.is_member(m)).count();
        info!(
            factory = self.name,
            joined,
            left,
            members = new_members.len(),
            under_replicated = updated.under_replicated_segments().len(),
            "updated consistent hash members"
        );

        Ok(updated)
    }

    fn rebalance(&self, base: &ConsistentHash) -> Result<ConsistentHash> {
        validate_counts(base.num_owners(), base.num_segments())?;
        if base.members().is_empty() {
            return Ok(base.clone());
        }

        let wheel = self.wheel(base);
        let stats = OwnershipStatistics::new(base);
        let targets = Targets::compute(&base.weights(), base.num_segments(), base.expected_owners());
        let rebalancer = Rebalancer::new(
            base.members(),
            &wheel,
            self.policy.as_ref(),
            base.expected_owners(),
            targets,
            base.segment_owner_indices(),
            stats.owned_counts().to_vec(),
            stats.primary_owned_counts().to_vec(),
        );
        let (owners, summary) = rebalancer.run();

        info!(
            factory = self.name,
            filled = summary.filled,
            diversified = summary.diversified,
            moved = summary.moved,
            primaries_swapped = summary.primaries_swapped,
            "rebalanced consistent hash"
        );

        ConsistentHash::from_member_indices(
            base.num_owners(),
            base.num_segments(),
            base.members().to_vec(),
            base.capacity_factors().map(<[f64]>::to_vec),
            owners,
        )
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
