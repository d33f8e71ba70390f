//! Publication of consistent hash versions.
//!
//! This crate owns the authoritative consistent hash of a process:
//! - Membership events are applied strictly in order
//! - Every new version is swapped in atomically; readers never block
//! - Rebalancing runs off the request path and stale results are dropped

pub mod coordinator;
pub mod error;
pub mod event;
pub mod published;

pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use event::MembershipEvent;
pub use published::{PublishedHash, Router};
