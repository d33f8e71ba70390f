//! `chctl`: build, query and simulate consistent hashes from the command
//! line.
//!
//! Provides commands for:
//! - Creating a rebalanced hash for a member list and printing ownership
//! - Locating the owners of a key
//! - Running leave/join simulations and reporting distribution metrics

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult, MemberSpec};
pub use config::CliConfig;
