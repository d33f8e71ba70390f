//! CLI entry point for chctl.

use clap::Parser;
use cli::CliConfig;

fn main() -> anyhow::Result<()> {
    CliConfig::parse().run()
}
