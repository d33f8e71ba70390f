//! Distribution metrics for consistent hashes.
//!
//! Measures how evenly segments (or keys) spread over members, and drives
//! the leave/join rotation used to profile a factory: the first member
//! leaves, the hash is rebalanced, a replacement with the same topology
//! joins at the end, the hash is rebalanced again.

use corelib::{Address, ConsistentHash, HashFunction, NodeId, OwnershipStatistics, Result};
use tracing::debug;

use crate::strategy::ConsistentHashFactory;

/// Summary statistics over per-node counts.
#[derive(Clone, Debug, PartialEq)]
pub struct Distribution {
    samples: Vec<u64>,
    mean: f64,
    std_dev: f64,
}

impl Distribution {
    pub fn from_samples(mut samples: Vec<u64>) -> Self {
        samples.sort_unstable();
        let n = samples.len().max(1) as f64;
        let mean = samples.iter().sum::<u64>() as f64 / n;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        Self {
            samples,
            mean,
            std_dev: variance.sqrt(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn min(&self) -> u64 {
        self.samples.first().copied().unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.samples.last().copied().unwrap_or(0)
    }

    /// Fraction of samples within `interval * mean` of the mean.
    pub fn fraction_within(&self, interval: f64) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let tolerance = interval * self.mean;
        let inside = self
            .samples
            .iter()
            .filter(|&&s| (s as f64 - self.mean).abs() <= tolerance)
            .count();
        inside as f64 / self.samples.len() as f64
    }

    /// `max / min`, infinite when some sample is zero and another is not.
    pub fn max_min_ratio(&self) -> f64 {
        match (self.min(), self.max()) {
            (_, 0) => 1.0,
            (0, _) => f64::INFINITY,
            (min, max) => max as f64 / min as f64,
        }
    }
}

/// Any-owner and primary distributions.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnershipDistribution {
    pub owned: Distribution,
    pub primary: Distribution,
}

/// Keys routed to each member when `num_keys` keys named `key-0`,
/// `key-1`, ... are hashed with `hash`.
pub fn key_distribution(
    ch: &ConsistentHash,
    hash: &dyn HashFunction,
    num_keys: usize,
) -> OwnershipDistribution {
    let mut owned = vec![0u64; ch.members().len()];
    let mut primary = vec![0u64; ch.members().len()];
    for key in 0..num_keys {
        let key_hash = hash.hash(format!("key-{key}").as_bytes());
        for (position, owner) in ch.locate_owners_for_key(key_hash).iter().enumerate() {
            if let Some(i) = ch.member_index(owner) {
                owned[i] += 1;
                if position == 0 {
                    primary[i] += 1;
                }
            }
        }
    }
    OwnershipDistribution {
        owned: Distribution::from_samples(owned),
        primary: Distribution::from_samples(primary),
    }
}

/// Outcome of one leave/join cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub cycle: usize,
    pub left: Address,
    pub joined: Address,
    pub sum_owned: usize,
    pub expected_sum_owned: usize,
    /// Segments-per-node max/min ratio after the cycle.
    pub owned_ratio: f64,
}

impl CycleReport {
    pub fn is_conserved(&self) -> bool {
        self.sum_owned == self.expected_sum_owned
    }
}

/// Result of [`leave_join_cycles`].
#[derive(Clone, Debug)]
pub struct CycleRun {
    pub cycles: Vec<CycleReport>,
    /// Owned / primary segment counts of every member after every cycle.
    pub distribution: OwnershipDistribution,
    pub last: ConsistentHash,
}

impl CycleRun {
    pub fn all_conserved(&self) -> bool {
        self.cycles.iter().all(CycleReport::is_conserved)
    }

    /// Largest segments-per-node ratio seen after any cycle.
    pub fn worst_ratio(&self) -> f64 {
        self.cycles
            .iter()
            .map(|c| c.owned_ratio)
            .fold(1.0, f64::max)
    }
}

/// A fresh identity for a member rejoining after `cycle`, keeping its name
/// and topology.
fn rejoin(leaver: &Address, cycle: usize) -> Address {
    let id = NodeId::from_name(&format!("{}#{}#{}", leaver.name, leaver.id, cycle + 1));
    let joiner = Address::new(id, leaver.name.clone());
    match leaver.topology() {
        Some(topology) => joiner.with_topology(topology.clone()),
        None => joiner,
    }
}

/// Run `loops` leave/join cycles starting from `create(members)`.
///
/// Each cycle removes the first member, rebalances, appends a replacement
/// with the same name and topology but a new identity, and rebalances again.
pub fn leave_join_cycles(
    factory: &dyn ConsistentHashFactory,
    num_owners: usize,
    num_segments: usize,
    members: &[Address],
    loops: usize,
) -> Result<CycleRun> {
    let mut members = members.to_vec();
    let mut ch = factory.create(num_owners, num_segments, &members, None)?;
    let mut cycles = Vec::with_capacity(loops);
    let mut owned = Vec::with_capacity(loops * members.len());
    let mut primary = Vec::with_capacity(loops * members.len());

    for cycle in 0..loops {
        if members.is_empty() {
            break;
        }
        let leaver = members.remove(0);
        ch = factory.rebalance(&factory.update_members(&ch, &members, None)?)?;

        let joiner = rejoin(&leaver, cycle);
        members.push(joiner.clone());
        ch = factory.rebalance(&factory.update_members(&ch, &members, None)?)?;

        let stats = OwnershipStatistics::new(&ch);
        owned.extend(stats.owned_counts().iter().map(|&c| c as u64));
        primary.extend(stats.primary_owned_counts().iter().map(|&c| c as u64));

        let report = CycleReport {
            cycle,
            left: leaver,
            joined: joiner,
            sum_owned: stats.sum_owned(),
            expected_sum_owned: num_segments * ch.expected_owners(),
            owned_ratio: stats.owned_ratio(),
        };
        debug!(
            factory = factory.name(),
            cycle,
            sum_owned = report.sum_owned,
            ratio = report.owned_ratio,
            "leave/join cycle"
        );
        cycles.push(report);
    }

    Ok(CycleRun {
        cycles,
        distribution: OwnershipDistribution {
            owned: Distribution::from_samples(owned),
            primary: Distribution::from_samples(primary),
        },
        last: ch,
    })
}
