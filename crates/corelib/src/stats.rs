//! Ownership statistics.
//!
//! Owned and primary-owned segment counts per node, computed in one pass over
//! a [`ConsistentHash`]. Used to check replication conservation and as the
//! load signal of the rebalancing step.

use std::collections::HashMap;

use crate::ch::ConsistentHash;
use crate::error::{Error, Result};
use crate::node::{Address, NodeId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipStatistics {
    nodes: Vec<Address>,
    index: HashMap<NodeId, usize>,
    owned: Vec<usize>,
    primary_owned: Vec<usize>,
}

impl OwnershipStatistics {
    /// Statistics for every member of `ch`, in member order.
    pub fn new(ch: &ConsistentHash) -> Self {
        Self::with_nodes(ch, ch.members())
    }

    /// Statistics for an explicit node list. Owners outside `nodes` are not
    /// counted; nodes that own nothing report zero.
    pub fn with_nodes(ch: &ConsistentHash, nodes: &[Address]) -> Self {
        let index: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();
        let mut owned = vec![0; nodes.len()];
        let mut primary_owned = vec![0; nodes.len()];

        for owners in ch.segment_owners() {
            for (position, owner) in owners.iter().enumerate() {
                if let Some(&i) = index.get(&owner.id) {
                    owned[i] += 1;
                    if position == 0 {
                        primary_owned[i] += 1;
                    }
                }
            }
        }

        Self {
            nodes: nodes.to_vec(),
            index,
            owned,
            primary_owned,
        }
    }

    fn position(&self, node: &Address) -> Result<usize> {
        self.index
            .get(&node.id)
            .copied()
            .ok_or_else(|| Error::argument(format!("{node} is not tracked by these statistics")))
    }

    pub fn nodes(&self) -> &[Address] {
        &self.nodes
    }

    /// Segments where `node` is any owner.
    pub fn owned(&self, node: &Address) -> Result<usize> {
        Ok(self.owned[self.position(node)?])
    }

    /// Segments where `node` is the primary owner.
    pub fn primary_owned(&self, node: &Address) -> Result<usize> {
        Ok(self.primary_owned[self.position(node)?])
    }

    /// Owned counts aligned with [`nodes`](Self::nodes).
    pub fn owned_counts(&self) -> &[usize] {
        &self.owned
    }

    /// Primary-owned counts aligned with [`nodes`](Self::nodes).
    pub fn primary_owned_counts(&self) -> &[usize] {
        &self.primary_owned
    }

    pub fn sum_owned(&self) -> usize {
        self.owned.iter().sum()
    }

    pub fn sum_primary_owned(&self) -> usize {
        self.primary_owned.iter().sum()
    }

    pub fn min_owned(&self) -> Option<usize> {
        self.owned.iter().copied().min()
    }

    pub fn max_owned(&self) -> Option<usize> {
        self.owned.iter().copied().max()
    }

    pub fn min_primary_owned(&self) -> Option<usize> {
        self.primary_owned.iter().copied().min()
    }

    pub fn max_primary_owned(&self) -> Option<usize> {
        self.primary_owned.iter().copied().max()
    }

    /// `max(owned) / min(owned)` over the tracked nodes.
    ///
    /// `1.0` when nothing is tracked or nothing is owned, infinite when some
    /// node owns nothing while another owns segments.
    pub fn owned_ratio(&self) -> f64 {
        match (self.min_owned(), self.max_owned()) {
            (Some(_), Some(0)) | (None, _) | (_, None) => 1.0,
            (Some(0), Some(_)) => f64::INFINITY,
            (Some(min), Some(max)) => max as f64 / min as f64,
        }
    }

    /// `(node, owned, primary_owned)` for every tracked node.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, usize, usize)> + '_ {
        self.nodes
            .iter()
            .zip(self.owned.iter().zip(&self.primary_owned))
            .map(|(node, (owned, primary))| (node, *owned, *primary))
    }
}
