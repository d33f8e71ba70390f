//! Flat, order-preserving representation of a consistent hash.
//!
//! The layout mirrors the hash exactly (member order, owner order), so a
//! hash rebuilt from a snapshot answers every query identically. The byte
//! encoding is left to whichever `serde` format the caller picks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ch::ConsistentHash;
use crate::error::{Error, Result};
use crate::node::{Address, NodeId};
use crate::topology::TopologyInfo;

/// One member entry: identity, topology, weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberEntry {
    /// Node id as 32 hex digits.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_factor: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsistentHashSnapshot {
    pub num_segments: usize,
    pub num_owners: usize,
    pub members: Vec<MemberEntry>,
    /// Owners per segment as indices into `members`, primary first.
    pub segment_owners: Vec<Vec<u32>>,
}

impl MemberEntry {
    fn from_address(address: &Address, capacity_factor: Option<f64>) -> Self {
        let topology = address.topology();
        let part = |value: Option<&Arc<str>>| value.map(|v| v.to_string());
        Self {
            id: address.id.to_string(),
            name: address.name.to_string(),
            site: part(topology.and_then(|t| t.site.as_ref())),
            rack: part(topology.and_then(|t| t.rack.as_ref())),
            machine: part(topology.and_then(|t| t.machine.as_ref())),
            capacity_factor,
        }
    }

    fn to_address(&self) -> Result<Address> {
        let id = u128::from_str_radix(&self.id, 16)
            .map_err(|e| Error::argument(format!("member id {:?}: {e}", self.id)))?;
        Ok(
            Address::new(NodeId(id), self.name.as_str()).with_topology(TopologyInfo::new(
                self.site.as_deref(),
                self.rack.as_deref(),
                self.machine.as_deref(),
            )),
        )
    }
}

impl ConsistentHash {
    pub fn to_snapshot(&self) -> ConsistentHashSnapshot {
        let weights = self.capacity_factors();
        let members = self
            .members()
            .iter()
            .enumerate()
            .map(|(i, m)| MemberEntry::from_address(m, weights.map(|w| w[i])))
            .collect();
        let segment_owners = self
            .segment_owner_indices()
            .into_iter()
            .map(|owners| owners.into_iter().map(|i| i as u32).collect())
            .collect();

        ConsistentHashSnapshot {
            num_segments: self.num_segments(),
            num_owners: self.num_owners(),
            members,
            segment_owners,
        }
    }

    /// Rebuild a hash, validating every invariant the constructor checks.
    ///
    /// Capacity factors must be given for all members or for none.
    pub fn from_snapshot(snapshot: &ConsistentHashSnapshot) -> Result<Self> {
        let members = snapshot
            .members
            .iter()
            .map(MemberEntry::to_address)
            .collect::<Result<Vec<Address>>>()?;

        let given = snapshot
            .members
            .iter()
            .filter(|m| m.capacity_factor.is_some())
            .count();
        let weights = match given {
            0 => None,
            n if n == members.len() => Some(
                snapshot
                    .members
                    .iter()
                    .filter_map(|m| m.capacity_factor)
                    .collect(),
            ),
            n => {
                return Err(Error::argument(format!(
                    "capacity factors given for {n} of {} members",
                    members.len()
                )))
            }
        };

        let owners = snapshot
            .segment_owners
            .iter()
            .map(|owners| owners.iter().map(|&i| i as usize).collect())
            .collect();

        ConsistentHash::from_member_indices(
            snapshot.num_owners,
            snapshot.num_segments,
            members,
            weights,
            owners,
        )
    }
}
