//! Sync consistent hash factory.
//!
//! Every member computes the consistent hash on its own, so the wheel must
//! come out the same on all of them. Virtual node positions are derived only
//! from node identities, the virtual node index and a fixed seed; nothing
//! local to the process goes in.
//!
//! # Algorithm
//!
//! 1. Each member gets `max(1, round(vnodes_per_unit * capacity_factor))`
//!    positions on a `2^31` wheel
//! 2. Segment `s` is anchored at `s * ceil(2^31 / num_segments)`
//! 3. Owners are the first `min(num_owners, members)` distinct members
//!    clockwise from the anchor
//!
//! # Performance
//!
//! - **create**: O(V log V + S * M) where V = virtual nodes, S = segments,
//!   M = members
//! - **rebalance**: O(S * M) per balancing pass

use std::sync::Arc;

use corelib::hash::Sip13Hash;
use corelib::HashFunction;

use crate::placement::AnyPlacement;
use crate::strategy::WheelStrategy;

/// Wheel seed shared by every process.
pub const SYNC_SEED: u64 = 0;

/// Reproducible wheel placement with no placement preference.
///
/// # Example
///
/// ```rust
/// use corelib::Address;
/// use replication::{ConsistentHashFactory, SyncFactory};
///
/// let members: Vec<Address> = ["a", "b", "c"].iter().map(|n| Address::named(n)).collect();
/// let factory = SyncFactory::new();
/// let ch = factory.create(2, 16, &members, None).unwrap();
///
/// // Any other process builds exactly the same hash.
/// assert_eq!(SyncFactory::new().create(2, 16, &members, None).unwrap(), ch);
/// ```
#[derive(Debug, Clone)]
pub struct SyncFactory {
    inner: WheelStrategy,
}

impl SyncFactory {
    pub fn new() -> Self {
        Self::with_hash(Arc::new(Sip13Hash))
    }

    /// Use `hash` to place virtual nodes.
    pub fn with_hash(hash: Arc<dyn HashFunction>) -> Self {
        Self {
            inner: WheelStrategy::new("sync", hash, SYNC_SEED, Arc::new(AnyPlacement)),
        }
    }

    pub fn with_vnodes_per_unit(mut self, vnodes_per_unit: usize) -> Self {
        self.inner = self.inner.with_vnodes_per_unit(vnodes_per_unit);
        self
    }

    pub fn strategy(&self) -> &WheelStrategy {
        &self.inner
    }
}

impl Default for SyncFactory {
    fn default() -> Self {
        Self::new()
    }
}

delegate_factory!(SyncFactory);
