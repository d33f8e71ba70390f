//! Core library for segment-based consistent hashing.
//!
//! This crate provides the fundamental abstractions the placement factories
//! build on:
//! - Node identity and failure-domain (topology) metadata
//! - Pluggable 32-bit hash providers
//! - The hash wheel and its virtual nodes
//! - The immutable `ConsistentHash` segment → owners mapping
//! - Ownership statistics and a flat snapshot form

pub mod ch;
pub mod config;
pub mod error;
pub mod hash;
pub mod node;
pub mod snapshot;
pub mod stats;
pub mod topology;
pub mod wheel;

pub use ch::{CapacityFactors, ConsistentHash, DEFAULT_CAPACITY_FACTOR};
pub use config::{FactoryKind, HashConfig};
pub use error::{Error, Result};
pub use hash::{HashFunction, HashKind};
pub use node::{Address, NodeId};
pub use snapshot::{ConsistentHashSnapshot, MemberEntry};
pub use stats::OwnershipStatistics;
pub use topology::{TopologyInfo, TopologyLevel};
pub use wheel::{VirtualNode, Wheel};
