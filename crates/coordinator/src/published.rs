//! The published consistent hash and the read-side router.

use std::sync::Arc;

use arc_swap::ArcSwap;
use corelib::{Address, ConsistentHash, HashFunction};

/// One published version of the consistent hash.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedHash {
    /// Increases with every publication.
    pub topology_id: u64,
    pub ch: ConsistentHash,
    /// `true` once a rebalance of the current membership has been applied.
    /// Until then some segments may be under-replicated or unevenly spread.
    pub rebalanced: bool,
}

/// Lock-free key routing over whatever hash is currently published.
#[derive(Clone)]
pub struct Router {
    published: Arc<ArcSwap<PublishedHash>>,
    hash: Arc<dyn HashFunction>,
}

impl Router {
    pub(crate) fn new(published: Arc<ArcSwap<PublishedHash>>, hash: Arc<dyn HashFunction>) -> Self {
        Self { published, hash }
    }

    pub fn key_hash(&self, key: &[u8]) -> u32 {
        self.hash.hash(key)
    }

    pub fn segment_for_key(&self, key: &[u8]) -> usize {
        self.published.load().ch.segment_for_key(self.key_hash(key))
    }

    /// Owners of `key`, primary first. Empty when there are no members.
    pub fn owners_for_key(&self, key: &[u8]) -> Vec<Address> {
        let key_hash = self.key_hash(key);
        self.published.load().ch.locate_owners_for_key(key_hash).to_vec()
    }

    pub fn primary_owner_for_key(&self, key: &[u8]) -> Option<Address> {
        let key_hash = self.key_hash(key);
        self.published
            .load()
            .ch
            .locate_primary_owner_for_key(key_hash)
            .cloned()
    }

    pub fn topology_id(&self) -> u64 {
        self.published.load().topology_id
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("topology_id", &self.topology_id())
            .field("hash", &self.hash.name())
            .finish()
    }
}
