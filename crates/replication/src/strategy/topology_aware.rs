//! Topology-aware consistent hash factory.
//!
//! Places replicas on the [`SyncFactory`](super::SyncFactory) wheel, but
//! spreads each segment's owners across failure domains. This is the
//! strategy to use when:
//!
//! - Members span several sites or racks
//! - Losing one machine or rack must not lose every copy of a segment
//!
//! # Algorithm
//!
//! When choosing owner `N > 0` of a segment, every remaining candidate is
//! ranked by the coarsest level at which it differs from *all* owners chosen
//! so far:
//!
//! 1. Different site
//! 2. Same site, different rack
//! 3. Same rack, different machine
//! 4. Nothing known differs, but one side knows a level the other does not
//! 5. Identical domain, or topology unknown
//!
//! The best-ranked candidate earliest on the wheel wins. If every candidate
//! shares a domain with a chosen owner, the wheel order alone decides, so
//! the replication factor is always met.
//!
//! Gap filling and balancing in `rebalance` use the same ranking and never
//! trade a diverse owner for a less diverse one.

use std::sync::Arc;

use corelib::hash::Sip13Hash;
use corelib::HashFunction;

use crate::placement::TopologyAwarePlacement;
use crate::strategy::sync::SYNC_SEED;
use crate::strategy::WheelStrategy;

/// Sync wheel placement with failure-domain diversification.
///
/// # Example
///
/// ```rust
/// use corelib::{Address, TopologyInfo};
/// use replication::{ConsistentHashFactory, TopologyAwareFactory};
///
/// let members: Vec<Address> = (0..4)
///     .map(|i| {
///         Address::named(&format!("n{i}"))
///             .with_topology(TopologyInfo::parse(&format!("s1/r{}/m{i}", i % 2)))
///     })
///     .collect();
///
/// let ch = TopologyAwareFactory::new().create(2, 16, &members, None).unwrap();
/// for segment in 0..16 {
///     let owners = ch.locate_owners(segment).unwrap();
///     assert_ne!(
///         owners[0].topology().unwrap().rack,
///         owners[1].topology().unwrap().rack
///     );
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TopologyAwareFactory {
    inner: WheelStrategy,
}

impl TopologyAwareFactory {
    pub fn new() -> Self {
        Self::with_hash(Arc::new(Sip13Hash))
    }

    pub fn with_hash(hash: Arc<dyn HashFunction>) -> Self {
        Self {
            inner: WheelStrategy::new(
                "topology-aware",
                hash,
                SYNC_SEED,
                Arc::new(TopologyAwarePlacement),
            ),
        }
    }

    pub fn with_vnodes_per_unit(mut self, vnodes_per_unit: usize) -> Self {
        self.inner = self.inner.with_vnodes_per_unit(vnodes_per_unit);
        self
    }
}

impl Default for TopologyAwareFactory {
    fn default() -> Self {
        Self::new()
    }
}

delegate_factory!(TopologyAwareFactory);
