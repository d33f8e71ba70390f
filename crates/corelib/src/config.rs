//! Hash configuration.
//!
//! Every member of a cluster must use the same configuration; the factories
//! derive identical consistent hashes only from identical inputs.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::HashKind;
use crate::wheel::{MAX_VNODES_PER_MEMBER, WHEEL_SIZE};

/// Default number of segments.
pub const DEFAULT_NUM_SEGMENTS: usize = 256;

/// Default replication factor.
pub const DEFAULT_NUM_OWNERS: usize = 2;

/// Default virtual nodes per unit of capacity factor.
pub const DEFAULT_VNODES_PER_UNIT: usize = 64;

/// Which factory strategy builds the consistent hash.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FactoryKind {
    /// Wheel seeded per process.
    Default,
    /// Wheel shared identically by all members.
    #[default]
    Sync,
    /// Sync wheel plus failure-domain diversification.
    TopologyAware,
}

impl std::str::FromStr for FactoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(FactoryKind::Default),
            "sync" => Ok(FactoryKind::Sync),
            "topology-aware" => Ok(FactoryKind::TopologyAware),
            other => Err(Error::config(format!("unknown factory {other:?}"))),
        }
    }
}

/// Parameters shared by every consistent hash a cluster produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub num_segments: usize,
    pub num_owners: usize,
    pub vnodes_per_unit: usize,
    pub hash: HashKind,
    pub factory: FactoryKind,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            num_segments: DEFAULT_NUM_SEGMENTS,
            num_owners: DEFAULT_NUM_OWNERS,
            vnodes_per_unit: DEFAULT_VNODES_PER_UNIT,
            hash: HashKind::default(),
            factory: FactoryKind::default(),
        }
    }
}

impl HashConfig {
    pub fn new(num_segments: usize, num_owners: usize) -> Self {
        Self {
            num_segments,
            num_owners,
            ..Self::default()
        }
    }

    pub fn with_factory(mut self, factory: FactoryKind) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_hash(mut self, hash: HashKind) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_vnodes_per_unit(mut self, vnodes_per_unit: usize) -> Self {
        self.vnodes_per_unit = vnodes_per_unit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_counts(self.num_owners, self.num_segments)?;
        if self.vnodes_per_unit == 0 {
            return Err(Error::config("vnodes_per_unit must be at least 1"));
        }
        if self.vnodes_per_unit > MAX_VNODES_PER_MEMBER {
            return Err(Error::config(format!(
                "vnodes_per_unit {} exceeds {MAX_VNODES_PER_MEMBER}",
                self.vnodes_per_unit
            )));
        }
        Ok(())
    }
}

/// Shared check for `num_owners` / `num_segments`.
pub fn validate_counts(num_owners: usize, num_segments: usize) -> Result<()> {
    if num_owners < 1 {
        return Err(Error::config("num_owners must be at least 1"));
    }
    if num_segments < 1 {
        return Err(Error::config("num_segments must be at least 1"));
    }
    if num_segments as u64 > WHEEL_SIZE {
        return Err(Error::config(format!(
            "num_segments {num_segments} exceeds the wheel size {WHEEL_SIZE}"
        )));
    }
    Ok(())
}
