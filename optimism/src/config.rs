use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct L1Config {
    pub chain_id: u64,
    /// Seconds between clique blocks.
    pub clique_period: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            chain_id: 900,
            clique_period: 2,
        }
    }
}

/// Rollup parameters shared by every op-node of the devnet. Serialized as the
/// `/rollup.json` each op-node is started with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    pub l1_chain_id: u64,
    pub l2_chain_id: u64,
    /// Seconds between L2 blocks.
    pub block_time: u64,
    pub max_sequencer_drift: u64,
    /// In L1 blocks.
    pub seq_window_size: u64,
    pub channel_timeout: u64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            l1_chain_id: 900,
            l2_chain_id: 901,
            block_time: 2,
            max_sequencer_drift: 20,
            seq_window_size: 10,
            channel_timeout: 30,
        }
    }
}

/// Client types started for each role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTypes {
    pub eth1: String,
    pub op_l2: String,
    pub op_node: String,
    pub op_batcher: String,
    pub op_proposer: String,
    pub contracts: String,
}

impl Default for ClientTypes {
    fn default() -> Self {
        Self {
            eth1: "ops-l1".to_string(),
            op_l2: "ops-l2".to_string(),
            op_node: "op-node".to_string(),
            op_batcher: "op-batcher".to_string(),
            op_proposer: "op-proposer".to_string(),
            contracts: "ops-contracts".to_string(),
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    pub l1: L1Config,
    pub rollup: RollupConfig,
    pub clients: ClientTypes,
    /// Bound on the probe that waits for a dependency node before contracts
    /// are deployed. Whole seconds in serialized form.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reachability_timeout: Duration,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            l1: L1Config::default(),
            rollup: RollupConfig::default(),
            clients: ClientTypes::default(),
            reachability_timeout: Duration::from_secs(10),
        }
    }
}

impl DevnetConfig {
    /// How long a scenario runs the network: three sequence windows.
    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.l1.clique_period * self.rollup.seq_window_size * 3)
    }
}
