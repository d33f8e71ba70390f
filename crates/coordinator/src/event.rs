//! Membership events and the member view they act on.

use corelib::{Address, CapacityFactors, Error, NodeId, Result};

/// A change reported by the membership service.
#[derive(Clone, Debug, PartialEq)]
pub enum MembershipEvent {
    /// A node joined, appended after the current members.
    Joined {
        member: Address,
        capacity_factor: Option<f64>,
    },
    /// A node left.
    Left(NodeId),
    /// A member's capacity factor changed.
    CapacityChanged { node: NodeId, capacity_factor: f64 },
    /// Full replacement of the member list, in order.
    View {
        members: Vec<Address>,
        capacity_factors: CapacityFactors,
    },
}

impl MembershipEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipEvent::Joined { .. } => "joined",
            MembershipEvent::Left(_) => "left",
            MembershipEvent::CapacityChanged { .. } => "capacity_changed",
            MembershipEvent::View { .. } => "view",
        }
    }
}

/// Ordered member list plus explicit capacity factors.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MemberView {
    pub members: Vec<Address>,
    pub capacity_factors: CapacityFactors,
}

impl MemberView {
    pub fn new(members: Vec<Address>, capacity_factors: CapacityFactors) -> Self {
        Self {
            members,
            capacity_factors,
        }
    }

    /// `None` when every member weighs the default.
    pub fn factors(&self) -> Option<&CapacityFactors> {
        (!self.capacity_factors.is_empty()).then_some(&self.capacity_factors)
    }

    fn contains(&self, node: NodeId) -> bool {
        self.members.iter().any(|m| m.id == node)
    }

    /// The view after `event`. The current view is left untouched on error.
    pub fn apply(&self, event: &MembershipEvent) -> Result<MemberView> {
        let mut next = self.clone();
        match event {
            MembershipEvent::Joined {
                member,
                capacity_factor,
            } => {
                if self.contains(member.id) {
                    return Err(Error::InvalidArgument(format!(
                        "{member} is already a member"
                    )));
                }
                next.members.push(member.clone());
                if let Some(factor) = capacity_factor {
                    next.capacity_factors.insert(member.id, *factor);
                }
            }
            MembershipEvent::Left(node) => {
                if !self.contains(*node) {
                    return Err(Error::InvalidArgument(format!("{node} is not a member")));
                }
                next.members.retain(|m| m.id != *node);
                next.capacity_factors.remove(node);
            }
            MembershipEvent::CapacityChanged {
                node,
                capacity_factor,
            } => {
                if !self.contains(*node) {
                    return Err(Error::InvalidArgument(format!("{node} is not a member")));
                }
                next.capacity_factors.insert(*node, *capacity_factor);
            }
            MembershipEvent::View {
                members,
                capacity_factors,
            } => {
                next = MemberView::new(members.clone(), capacity_factors.clone());
            }
        }
        Ok(next)
    }
}
