//! Command-line configuration for `chctl`.
//!
//! Hash parameters come from an optional JSON file (a serialized
//! [`HashConfig`]); flags given on the command line override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use corelib::{FactoryKind, HashConfig, HashKind};
use tracing::{debug, info};

use crate::commands::Command;

#[derive(Debug, Parser)]
#[command(
    name = "chctl",
    version,
    about = "Build, query and simulate segment-based consistent hashes"
)]
pub struct CliConfig {
    /// Path to a JSON hash configuration.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of segments.
    #[arg(long, global = true)]
    pub segments: Option<usize>,

    /// Owners per segment.
    #[arg(long, global = true)]
    pub owners: Option<usize>,

    /// Virtual nodes per unit of capacity factor.
    #[arg(long, global = true)]
    pub vnodes: Option<usize>,

    /// Factory strategy: `default`, `sync` or `topology-aware`.
    #[arg(long, global = true)]
    pub factory: Option<FactoryKind>,

    /// Hash function: `sip13`, `xxh3` or `blake3`.
    #[arg(long, global = true)]
    pub hash: Option<HashKind>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// The file configuration (or defaults) with command-line overrides
    /// applied, validated.
    pub fn hash_config(&self) -> Result<HashConfig> {
        let mut config = match &self.config {
            Some(path) => load(path)?,
            None => HashConfig::default(),
        };
        if let Some(segments) = self.segments {
            config.num_segments = segments;
        }
        if let Some(owners) = self.owners {
            config.num_owners = owners;
        }
        if let Some(vnodes) = self.vnodes {
            config.vnodes_per_unit = vnodes;
        }
        if let Some(factory) = self.factory {
            config.factory = factory;
        }
        if let Some(hash) = self.hash {
            config.hash = hash;
        }
        config.validate().context("invalid hash configuration")?;
        Ok(config)
    }

    pub fn run(self) -> Result<()> {
        setup_tracing(&self.log_level);
        let config = self.hash_config()?;
        info!(
            segments = config.num_segments,
            owners = config.num_owners,
            factory = ?config.factory,
            hash = ?config.hash,
            "hash configuration"
        );

        let result = self.command.execute(&config)?;
        if self.json {
            let out = serde_json::to_string_pretty(&result).context("failed to encode result")?;
            println!("{out}");
        } else {
            print!("{result}");
        }
        Ok(())
    }
}

fn load(path: &Path) -> Result<HashConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Respects `RUST_LOG` if set, otherwise uses `level`. Logs go to stderr so
/// `--json` output stays parseable.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
