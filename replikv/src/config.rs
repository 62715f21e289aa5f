use std::{fmt, fs, path::Path, str::FromStr, time::Duration};

use agreement::{PaxosConfig, TwoPhaseConfig};
use labrpc::{
    anyhow::{anyhow, bail, Context, Result},
    Directory,
};
use serde::{Deserialize, Serialize};

/// Agreement protocol every node of a cluster runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Unanimous two-phase commit.
    TwoPhaseCommit,
    /// Majority Paxos.
    Paxos,
}

impl FromStr for Protocol {
    type Err = labrpc::anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "2pc" | "two_phase_commit" | "two-phase-commit" => Ok(Protocol::TwoPhaseCommit),
            "paxos" => Ok(Protocol::Paxos),
            _ => Err(anyhow!("unknown protocol {:?}, expected 2pc or paxos", s)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::TwoPhaseCommit => f.write_str("2pc"),
            Protocol::Paxos => f.write_str("paxos"),
        }
    }
}

/// Settings of a whole cluster, shared by every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Host part of every node address.
    pub host: String,
    /// Node `i` listens on `base_port + i + 1`.
    pub base_port: u16,
    /// Number of nodes.
    pub nodes: u32,
    /// Agreement protocol.
    pub protocol: Protocol,
    /// Deadline of a single RPC.
    pub rpc_timeout_ms: u64,
    /// Probability that a protocol message is lost.
    pub fault_probability: f32,
    /// 2PC knobs.
    pub two_phase: TwoPhaseConfig,
    /// Paxos knobs.
    pub paxos: PaxosConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            base_port: 9000,
            nodes: 3,
            protocol: Protocol::Paxos,
            rpc_timeout_ms: 500,
            fault_probability: 0.0,
            two_phase: TwoPhaseConfig::default(),
            paxos: PaxosConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Read a JSON config; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no cluster can run with.
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            bail!("a cluster needs at least one node");
        }
        if u32::from(self.base_port) + self.nodes > u32::from(u16::MAX) {
            bail!(
                "{} nodes do not fit above base port {}",
                self.nodes,
                self.base_port
            );
        }
        if self.rpc_timeout_ms == 0 {
            bail!("rpc_timeout_ms must be positive");
        }
        if !(0.0..=1.0).contains(&self.fault_probability) {
            bail!(
                "fault_probability {} is not within [0, 1]",
                self.fault_probability
            );
        }
        Ok(())
    }

    /// Node addresses.
    pub fn directory(&self) -> Directory {
        Directory::new(self.host.clone(), self.base_port, self.nodes)
    }

    /// `rpc_timeout_ms` as a [`Duration`].
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
