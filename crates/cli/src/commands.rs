//! `chctl` subcommands and their printable results.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use corelib::{
    Address, CapacityFactors, ConsistentHash, ConsistentHashSnapshot, HashConfig,
    OwnershipStatistics, TopologyInfo,
};
use replication::{build_factory, key_distribution, leave_join_cycles, Distribution};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build and rebalance a consistent hash, then print its ownership.
    Create(MembersArgs),

    /// Print the segment and owners of a key.
    Locate {
        #[command(flatten)]
        members: MembersArgs,

        /// Key to locate.
        #[arg(short, long)]
        key: String,
    },

    /// Remove the first member and re-add it as the last, repeatedly, and
    /// print how segments and keys spread across members.
    Simulate {
        /// Number of members.
        #[arg(short, long, default_value_t = 8)]
        nodes: usize,

        /// Number of leave/join cycles.
        #[arg(short, long, default_value_t = 16)]
        loops: usize,

        /// Spread members over this many racks (0 for no topology).
        #[arg(long, default_value_t = 0)]
        racks: usize,

        /// Keys hashed for the final key distribution.
        #[arg(long, default_value_t = 10_000)]
        keys: usize,
    },
}

#[derive(Debug, Clone, Args)]
pub struct MembersArgs {
    /// Comma-separated members, each `name[@site/rack/machine][*capacity]`.
    #[arg(short, long, value_delimiter = ',', default_values = ["n0", "n1", "n2", "n3"])]
    pub members: Vec<MemberSpec>,
}

impl MembersArgs {
    fn resolve(&self) -> (Vec<Address>, Option<CapacityFactors>) {
        let members = self.members.iter().map(|m| m.address.clone()).collect();
        let factors: CapacityFactors = self
            .members
            .iter()
            .filter_map(|m| m.capacity_factor.map(|cf| (m.address.id, cf)))
            .collect();
        (members, (!factors.is_empty()).then_some(factors))
    }
}

/// A member given on the command line as `name[@site/rack/machine][*capacity]`.
///
/// ```
/// use cli::commands::MemberSpec;
///
/// let spec: MemberSpec = "n0@s1/r0/m0*2.0".parse().unwrap();
/// assert_eq!(&*spec.address.name, "n0");
/// assert_eq!(spec.capacity_factor, Some(2.0));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MemberSpec {
    pub address: Address,
    pub capacity_factor: Option<f64>,
}

impl FromStr for MemberSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (rest, capacity_factor) = match s.rsplit_once('*') {
            Some((rest, cf)) => {
                let cf: f64 = cf
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid capacity factor in {s:?}"))?;
                (rest, Some(cf))
            }
            None => (s, None),
        };
        let (name, topology) = match rest.split_once('@') {
            Some((name, topology)) => (name, Some(TopologyInfo::parse(topology))),
            None => (rest, None),
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("member {s:?} has no name");
        }
        let address = match topology {
            Some(topology) => Address::named(name).with_topology(topology),
            None => Address::named(name),
        };
        Ok(Self {
            address,
            capacity_factor,
        })
    }
}

impl Command {
    pub fn execute(&self, config: &HashConfig) -> Result<CommandResult> {
        match self {
            Command::Create(members) => {
                let ch = build(config, members)?;
                Ok(CommandResult::Create {
                    ownership: ownership(&ch),
                    snapshot: ch.to_snapshot(),
                })
            }
            Command::Locate { members, key } => {
                let ch = build(config, members)?;
                let key_hash = config.hash.build().hash(key.as_bytes());
                Ok(CommandResult::Locate {
                    key: key.clone(),
                    key_hash,
                    segment: ch.segment_for_key(key_hash),
                    owners: ch
                        .locate_owners_for_key(key_hash)
                        .iter()
                        .map(|o| o.to_string())
                        .collect(),
                })
            }
            Command::Simulate {
                nodes,
                loops,
                racks,
                keys,
            } => simulate(config, *nodes, *loops, *racks, *keys).map(CommandResult::Simulate),
        }
    }
}

fn build(config: &HashConfig, members: &MembersArgs) -> Result<ConsistentHash> {
    let factory = build_factory(config)?;
    let (members, factors) = members.resolve();
    let ch = factory
        .create(
            config.num_owners,
            config.num_segments,
            &members,
            factors.as_ref(),
        )
        .context("failed to create consistent hash")?;
    let ch = factory.rebalance(&ch).context("failed to rebalance")?;
    info!(
        factory = factory.name(),
        members = members.len(),
        "consistent hash built"
    );
    Ok(ch)
}

fn ownership(ch: &ConsistentHash) -> Vec<NodeOwnership> {
    OwnershipStatistics::new(ch)
        .iter()
        .map(|(node, owned, primary_owned)| NodeOwnership {
            name: node.name.to_string(),
            topology: node.topology().map(|t| t.to_string()),
            owned,
            primary_owned,
        })
        .collect()
}

fn simulate(
    config: &HashConfig,
    nodes: usize,
    loops: usize,
    racks: usize,
    keys: usize,
) -> Result<SimulationReport> {
    if nodes == 0 {
        bail!("simulation needs at least one node");
    }
    let factory = build_factory(config)?;
    let members: Vec<Address> = (0..nodes)
        .map(|i| {
            let address = Address::named(&format!("n{i}"));
            if racks == 0 {
                address
            } else {
                address.with_topology(TopologyInfo::parse(&format!("s0/r{}/m{i}", i % racks)))
            }
        })
        .collect();

    let run = leave_join_cycles(
        &*factory,
        config.num_owners,
        config.num_segments,
        &members,
        loops,
    )
    .context("leave/join simulation failed")?;
    let hash = config.hash.build();
    let key_dist = key_distribution(&run.last, &*hash, keys);

    Ok(SimulationReport {
        factory: factory.name().to_string(),
        nodes,
        loops,
        conserved: run.all_conserved(),
        worst_ratio: run.worst_ratio(),
        segments_owned: DistributionSummary::from(&run.distribution.owned),
        segments_primary: DistributionSummary::from(&run.distribution.primary),
        keys_owned: DistributionSummary::from(&key_dist.owned),
        keys_primary: DistributionSummary::from(&key_dist.primary),
    })
}

/// Output of a command, printed as text or JSON.
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandResult {
    Create {
        ownership: Vec<NodeOwnership>,
        snapshot: ConsistentHashSnapshot,
    },
    Locate {
        key: String,
        key_hash: u32,
        segment: usize,
        owners: Vec<String>,
    },
    Simulate(SimulationReport),
}

#[derive(Debug, Serialize)]
pub struct NodeOwnership {
    pub name: String,
    pub topology: Option<String>,
    pub owned: usize,
    pub primary_owned: usize,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub factory: String,
    pub nodes: usize,
    pub loops: usize,
    /// Every cycle kept `num_segments * expected_owners` assignments.
    pub conserved: bool,
    pub worst_ratio: f64,
    pub segments_owned: DistributionSummary,
    pub segments_primary: DistributionSummary,
    pub keys_owned: DistributionSummary,
    pub keys_primary: DistributionSummary,
}

#[derive(Debug, Serialize)]
pub struct DistributionSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub min: u64,
    pub max: u64,
    pub within_10_percent: f64,
    pub within_20_percent: f64,
    pub max_min_ratio: f64,
}

impl From<&Distribution> for DistributionSummary {
    fn from(d: &Distribution) -> Self {
        Self {
            mean: d.mean(),
            std_dev: d.std_dev(),
            min: d.min(),
            max: d.max(),
            within_10_percent: d.fraction_within(0.1),
            within_20_percent: d.fraction_within(0.2),
            max_min_ratio: d.max_min_ratio(),
        }
    }
}

impl fmt::Display for DistributionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {:.1} sd {:.2} min {} max {} ratio {:.3} within 10% {:.0}% within 20% {:.0}%",
            self.mean,
            self.std_dev,
            self.min,
            self.max,
            self.max_min_ratio,
            self.within_10_percent * 100.0,
            self.within_20_percent * 100.0
        )
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Create {
                ownership,
                snapshot,
            } => {
                writeln!(
                    f,
                    "segments={} owners={} members={}",
                    snapshot.num_segments,
                    snapshot.num_owners,
                    snapshot.members.len()
                )?;
                writeln!(f, "{:<16} {:<16} {:>7} {:>7}", "member", "topology", "owned", "primary")?;
                for node in ownership {
                    writeln!(
                        f,
                        "{:<16} {:<16} {:>7} {:>7}",
                        node.name,
                        node.topology.as_deref().unwrap_or("-"),
                        node.owned,
                        node.primary_owned
                    )?;
                }
                writeln!(f)?;
                for (segment, owners) in snapshot.segment_owners.iter().enumerate() {
                    let names: Vec<&str> = owners
                        .iter()
                        .filter_map(|&i| snapshot.members.get(i as usize))
                        .map(|m| m.name.as_str())
                        .collect();
                    writeln!(f, "{segment:>5}: [{}]", names.join(", "))?;
                }
                Ok(())
            }
            CommandResult::Locate {
                key,
                key_hash,
                segment,
                owners,
            } => {
                writeln!(f, "key {key:?} hash {key_hash:#010x} segment {segment}")?;
                for (position, owner) in owners.iter().enumerate() {
                    let role = if position == 0 { "primary" } else { "backup" };
                    writeln!(f, "  {role:<8} {owner}")?;
                }
                Ok(())
            }
            CommandResult::Simulate(report) => {
                writeln!(
                    f,
                    "{} factory, {} nodes, {} cycles: conserved={} worst ratio {:.3}",
                    report.factory, report.nodes, report.loops, report.conserved, report.worst_ratio
                )?;
                writeln!(f, "segments owned    {}", report.segments_owned)?;
                writeln!(f, "segments primary  {}", report.segments_primary)?;
                writeln!(f, "keys owned        {}", report.keys_owned)?;
                writeln!(f, "keys primary      {}", report.keys_primary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::FactoryKind;

    fn specs(s: &str) -> MembersArgs {
        MembersArgs {
            members: s.split(',').map(|m| m.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn test_parse_member_spec() {
        let plain: MemberSpec = "n0".parse().unwrap();
        assert_eq!(plain.address, Address::named("n0"));
        assert!(plain.address.topology().is_none());
        assert_eq!(plain.capacity_factor, None);

        let full: MemberSpec = "n1@s1/r0/m3*0.5".parse().unwrap();
        assert_eq!(full.address, Address::named("n1"));
        assert_eq!(full.address.topology().unwrap().to_string(), "s1/r0/m3");
        assert_eq!(full.capacity_factor, Some(0.5));

        let weighted: MemberSpec = "n2*3".parse().unwrap();
        assert_eq!(weighted.capacity_factor, Some(3.0));
    }

    #[test]
    fn test_parse_member_spec_errors() {
        assert!("".parse::<MemberSpec>().is_err());
        assert!("@s1/r0".parse::<MemberSpec>().is_err());
        assert!("n0*heavy".parse::<MemberSpec>().is_err());
    }

    #[test]
    fn test_create_reports_full_ownership() {
        let config = HashConfig::new(60, 2).with_factory(FactoryKind::TopologyAware);
        let result = Command::Create(specs("n0@s1/r0/m0,n1@s1/r1/m1,n2@s1/r0/m2,n3@s1/r1/m3"))
            .execute(&config)
            .unwrap();
        let CommandResult::Create {
            ownership,
            snapshot,
        } = result
        else {
            panic!("unexpected result");
        };
        assert_eq!(ownership.iter().map(|n| n.owned).sum::<usize>(), 120);
        assert_eq!(ownership.iter().map(|n| n.primary_owned).sum::<usize>(), 60);
        assert!(ownership.iter().all(|n| n.owned == 30));
        assert_eq!(snapshot.segment_owners.len(), 60);
    }

    #[test]
    fn test_capacity_factors_are_applied() {
        let config = HashConfig::new(60, 1);
        let result = Command::Create(specs("n0*2,n1,n2,n3"))
            .execute(&config)
            .unwrap();
        let CommandResult::Create { ownership, .. } = result else {
            panic!("unexpected result");
        };
        assert_eq!(ownership.iter().map(|n| n.owned).sum::<usize>(), 60);
        assert!((23..=25).contains(&ownership[0].owned));
        for node in &ownership[1..] {
            assert!((11..=13).contains(&node.owned), "{}", node.name);
        }
    }

    #[test]
    fn test_locate_matches_hash() {
        let config = HashConfig::new(32, 2);
        let members = specs("a,b,c");
        let result = Command::Locate {
            members: members.clone(),
            key: "user:42".to_string(),
        }
        .execute(&config)
        .unwrap();
        let CommandResult::Locate {
            key_hash,
            segment,
            owners,
            ..
        } = result
        else {
            panic!("unexpected result");
        };
        assert_eq!(key_hash, config.hash.build().hash(b"user:42"));
        let ch = build(&config, &members).unwrap();
        assert_eq!(segment, ch.segment_for_key(key_hash));
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0], ch.locate_owners_for_key(key_hash)[0].to_string());
    }

    #[test]
    fn test_simulate_conserves_ownership() {
        let config = HashConfig::new(64, 2).with_factory(FactoryKind::TopologyAware);
        let result = Command::Simulate {
            nodes: 6,
            loops: 6,
            racks: 2,
            keys: 1_000,
        }
        .execute(&config)
        .unwrap();
        assert!(result.to_string().contains("conserved=true"));
        let CommandResult::Simulate(report) = result else {
            panic!("unexpected result");
        };
        assert!(report.conserved);
        assert_eq!(report.factory, "topology-aware");
        assert!(report.segments_owned.min > 0);
    }

    #[test]
    fn test_simulate_without_nodes_fails() {
        let result = Command::Simulate {
            nodes: 0,
            loops: 1,
            racks: 0,
            keys: 10,
        }
        .execute(&HashConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_json_output_is_tagged() {
        let result = Command::Create(specs("n0,n1"))
            .execute(&HashConfig::new(4, 1))
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["command"], "create");
        assert_eq!(json["snapshot"]["num_segments"], 4);
    }
}
