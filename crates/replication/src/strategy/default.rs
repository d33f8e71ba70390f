//! Default consistent hash factory.
//!
//! Same wheel placement as [`SyncFactory`](super::SyncFactory), but the wheel
//! is seeded per process. Two processes building a hash for the same members
//! generally disagree, so this factory suits a single coordinator that
//! computes the hash and ships it to everyone else as a snapshot.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use corelib::hash::Sip13Hash;
use corelib::HashFunction;

use crate::placement::AnyPlacement;
use crate::strategy::WheelStrategy;

#[derive(Debug, Clone)]
pub struct DefaultFactory {
    inner: WheelStrategy,
}

fn local_seed() -> u64 {
    RandomState::new().build_hasher().finish()
}

impl DefaultFactory {
    /// Factory with a fresh process-local seed.
    pub fn new() -> Self {
        Self::with_hash(Arc::new(Sip13Hash))
    }

    pub fn with_hash(hash: Arc<dyn HashFunction>) -> Self {
        Self::build(hash, local_seed())
    }

    /// Factory with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self::build(Arc::new(Sip13Hash), seed)
    }

    fn build(hash: Arc<dyn HashFunction>, seed: u64) -> Self {
        Self {
            inner: WheelStrategy::new("default", hash, seed, Arc::new(AnyPlacement)),
        }
    }

    pub fn with_vnodes_per_unit(mut self, vnodes_per_unit: usize) -> Self {
        self.inner = self.inner.with_vnodes_per_unit(vnodes_per_unit);
        self
    }

    pub fn seed(&self) -> u64 {
        self.inner.seed()
    }
}

impl Default for DefaultFactory {
    fn default() -> Self {
        Self::new()
    }
}

delegate_factory!(DefaultFactory);
