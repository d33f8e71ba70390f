//! Node abstractions for the consistent hash.
//!
//! Nodes are identified by a compact `NodeId` that is cheap to compare and
//! hash. An [`Address`] pairs that identity with a display name and optional
//! failure-domain metadata.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::topology::TopologyInfo;

/// Compact identifier for a node in the cluster.
///
/// Newtype over `u128` so comparisons and hashing are very fast while giving
/// plenty of space for uniqueness.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub u128);

impl NodeId {
    /// Derive an id from a name. The same name always yields the same id.
    pub fn from_name(name: &str) -> Self {
        let digest = blake3::hash(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        NodeId(u128::from_be_bytes(bytes))
    }

    /// Big-endian bytes, the form fed to the hash provider.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A cluster member as seen by the consistent hash.
///
/// Identity is the `id` alone: two addresses with the same id are the same
/// member even if the name or topology differ. Cloning is cheap (reference
/// counted strings).
#[derive(Clone, Debug)]
pub struct Address {
    pub id: NodeId,
    /// Human-readable name or hostname.
    pub name: Arc<str>,
    /// Failure-domain descriptor; `None` means the domain is unknown.
    pub topology: Option<TopologyInfo>,
}

impl Address {
    /// Construct an address with no topology information.
    pub fn new(id: NodeId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            topology: None,
        }
    }

    /// Construct an address whose id is derived from its name.
    pub fn named(name: &str) -> Self {
        Self::new(NodeId::from_name(name), name)
    }

    pub fn with_topology(mut self, topology: TopologyInfo) -> Self {
        self.topology = if topology.is_unknown() {
            None
        } else {
            Some(topology)
        };
        self
    }

    pub fn topology(&self) -> Option<&TopologyInfo> {
        self.topology.as_ref()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(topology) = &self.topology {
            write!(f, "({})", topology)?;
        }
        Ok(())
    }
}
