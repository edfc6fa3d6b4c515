use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use hivesim::types::NodeParams;
use hivesim::{Client, Test};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::config::DevnetConfig;
use crate::error::{Error, Result};
use crate::nodes::{
    BatcherNode, Eth1Node, ExecutionEndpoints, Node, OpContracts, OpL2Engine, OpNode,
    ProposerNode, RollupEndpoints,
};
use crate::rpc::EthClient;

pub const HIVE_L1_CHAIN_ID: &str = "HIVE_L1_CHAIN_ID";
pub const HIVE_L2_CHAIN_ID: &str = "HIVE_L2_CHAIN_ID";
pub const HIVE_CLIQUE_PERIOD: &str = "HIVE_CLIQUE_PERIOD";
pub const HIVE_L1_ETH_RPC: &str = "HIVE_L1_ETH_RPC";
pub const HIVE_L2_ETH_RPC: &str = "HIVE_L2_ETH_RPC";
pub const HIVE_L2_ENGINE_RPC: &str = "HIVE_L2_ENGINE_RPC";
pub const HIVE_ROLLUP_RPC: &str = "HIVE_ROLLUP_RPC";
pub const HIVE_SEQUENCER: &str = "HIVE_SEQUENCER";
/// Upload name of the rollup config every op-node starts with.
pub const ROLLUP_CONFIG_FILE: &str = "/rollup.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Eth1,
    OpL2Engine,
    OpNode,
    OpBatcher,
    OpProposer,
    Contracts,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Eth1 => "eth1",
            Role::OpL2Engine => "op-l2",
            Role::OpNode => "op-node",
            Role::OpBatcher => "op-batcher",
            Role::OpProposer => "op-proposer",
            Role::Contracts => "contracts",
        })
    }
}

/// Nodes of one role in the order they were added. An index never changes
/// once handed out.
#[derive(Clone, Debug)]
pub struct Registry<T> {
    nodes: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> Registry<T> {
    pub fn push(&mut self, node: T) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }
}

fn lookup<T>(registry: &Registry<T>, role: Role, index: usize) -> Result<&T> {
    registry.get(index).ok_or(Error::MissingNode { role, index })
}

/// Waits for `eth1` to answer `eth_chainId`, bounded by `timeout`.
pub async fn probe_reachable(eth1: &EthClient, timeout: Duration) -> Result<u64> {
    tokio::time::timeout(timeout, eth1.chain_id())
        .await
        .map_err(|_| Error::Timeout {
            method: "eth_chainId",
            timeout,
        })?
}

/// An optimism network started node by node inside one hive test.
///
/// Every `add_*` call finishes provisioning before it returns, so nodes can
/// refer to the nodes added before them by role and index.
pub struct Devnet {
    test: Test,
    config: DevnetConfig,
    work_dir: TempDir,
    rollup_config: Option<PathBuf>,
    /// Every container started, in creation order.
    created: Vec<(Role, String)>,
    eth1s: Registry<Eth1Node>,
    op_l2s: Registry<OpL2Engine>,
    op_nodes: Registry<OpNode>,
    batchers: Registry<BatcherNode>,
    proposers: Registry<ProposerNode>,
    contracts: Registry<OpContracts>,
}

impl Devnet {
    pub fn new(test: Test, config: DevnetConfig) -> Result<Self> {
        Ok(Self {
            test,
            config,
            work_dir: tempfile::tempdir()?,
            rollup_config: None,
            created: Vec::new(),
            eth1s: Registry::default(),
            op_l2s: Registry::default(),
            op_nodes: Registry::default(),
            batchers: Registry::default(),
            proposers: Registry::default(),
            contracts: Registry::default(),
        })
    }

    pub fn config(&self) -> &DevnetConfig {
        &self.config
    }

    /// Containers started so far, oldest first.
    pub fn containers(&self) -> impl Iterator<Item = (Role, &str)> {
        self.created
            .iter()
            .map(|(role, container)| (*role, container.as_str()))
    }

    async fn provision(&mut self, role: Role, params: NodeParams) -> Result<Client> {
        match self.test.start_client_with(&params).await {
            Ok(client) => {
                info!(%role, container = %client.container, ip = %client.ip, "started node");
                self.created.push((role, client.container.clone()));
                Ok(client)
            }
            Err(err) => {
                // the container exists, keep it around for shutdown
                if let Some(container) = err.orphaned_container() {
                    warn!(%role, container, "node started without an address");
                    self.created.push((role, container.to_string()));
                }
                Err(err.into())
            }
        }
    }

    fn chain_params(&self, client_type: &str) -> NodeParams {
        NodeParams::new(client_type)
            .param(HIVE_L1_CHAIN_ID, self.config.l1.chain_id.to_string())
            .param(HIVE_L2_CHAIN_ID, self.config.rollup.l2_chain_id.to_string())
    }

    fn rollup_config_path(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.rollup_config {
            return Ok(path.clone());
        }
        let path = self.work_dir.path().join("rollup.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&self.config.rollup)?)?;
        self.rollup_config = Some(path.clone());
        Ok(path)
    }

    pub async fn add_eth1(&mut self, overrides: NodeParams) -> Result<usize> {
        let params = self
            .chain_params(&self.config.clients.eth1)
            .param(HIVE_CLIQUE_PERIOD, self.config.l1.clique_period.to_string())
            .merge(overrides);
        let client = self.provision(Role::Eth1, params).await?;
        Ok(self.eth1s.push(Eth1Node::new(client)))
    }

    /// Waits for eth1 node `eth1` to answer RPC and then starts the node that
    /// deploys the L1 contracts against it. An L1 that does not come up in
    /// time fails the whole devnet.
    pub async fn deploy_contracts(&mut self, eth1: usize, overrides: NodeParams) -> Result<usize> {
        let l1 = lookup(&self.eth1s, Role::Eth1, eth1)?;
        let l1_rpc = l1.http_rpc_endpoint();
        let chain_id = probe_reachable(&l1.eth_client(), self.config.reachability_timeout)
            .await
            .map_err(|err| Error::Unreachable {
                role: Role::Eth1,
                index: eth1,
                reason: err.to_string(),
            })?;
        if chain_id != self.config.l1.chain_id {
            warn!(
                chain_id,
                expected = self.config.l1.chain_id,
                "L1 reports an unexpected chain id"
            );
        }

        let params = self
            .chain_params(&self.config.clients.contracts)
            .param(HIVE_L1_ETH_RPC, l1_rpc)
            .merge(overrides);
        let client = self.provision(Role::Contracts, params).await?;
        Ok(self.contracts.push(OpContracts::new(client)))
    }

    pub async fn add_op_l2(&mut self, overrides: NodeParams) -> Result<usize> {
        let params = self
            .chain_params(&self.config.clients.op_l2)
            .merge(overrides);
        let client = self.provision(Role::OpL2Engine, params).await?;
        Ok(self.op_l2s.push(OpL2Engine::new(client)))
    }

    /// Starts a rollup node on top of eth1 node `eth1` and L2 engine `l2`. The
    /// first op-node of the devnet is the sequencer.
    pub async fn add_op_node(
        &mut self,
        eth1: usize,
        l2: usize,
        overrides: NodeParams,
    ) -> Result<usize> {
        let l1_rpc = lookup(&self.eth1s, Role::Eth1, eth1)?.http_rpc_endpoint();
        let engine_rpc = lookup(&self.op_l2s, Role::OpL2Engine, l2)?.engine_endpoint();
        let rollup_config = self.rollup_config_path()?;

        let mut params = self
            .chain_params(&self.config.clients.op_node)
            .param(HIVE_L1_ETH_RPC, l1_rpc)
            .param(HIVE_L2_ENGINE_RPC, engine_rpc)
            .file(ROLLUP_CONFIG_FILE, rollup_config);
        if self.op_nodes.is_empty() {
            params = params.param(HIVE_SEQUENCER, "true");
        }

        let client = self.provision(Role::OpNode, params.merge(overrides)).await?;
        Ok(self.op_nodes.push(OpNode::new(client)))
    }

    fn service_params(
        &self,
        client_type: &str,
        eth1: usize,
        l2: usize,
        op_node: usize,
    ) -> Result<NodeParams> {
        Ok(self
            .chain_params(client_type)
            .param(
                HIVE_L1_ETH_RPC,
                lookup(&self.eth1s, Role::Eth1, eth1)?.http_rpc_endpoint(),
            )
            .param(
                HIVE_L2_ETH_RPC,
                lookup(&self.op_l2s, Role::OpL2Engine, l2)?.http_rpc_endpoint(),
            )
            .param(
                HIVE_ROLLUP_RPC,
                lookup(&self.op_nodes, Role::OpNode, op_node)?.rollup_rpc_endpoint(),
            ))
    }

    pub async fn add_op_batcher(
        &mut self,
        eth1: usize,
        l2: usize,
        op_node: usize,
        overrides: NodeParams,
    ) -> Result<usize> {
        let params = self
            .service_params(&self.config.clients.op_batcher, eth1, l2, op_node)?
            .merge(overrides);
        let client = self.provision(Role::OpBatcher, params).await?;
        Ok(self.batchers.push(BatcherNode::new(client)))
    }

    pub async fn add_op_proposer(
        &mut self,
        eth1: usize,
        l2: usize,
        op_node: usize,
        overrides: NodeParams,
    ) -> Result<usize> {
        let params = self
            .service_params(&self.config.clients.op_proposer, eth1, l2, op_node)?
            .merge(overrides);
        let client = self.provision(Role::OpProposer, params).await?;
        Ok(self.proposers.push(ProposerNode::new(client)))
    }

    pub fn get_eth1(&self, index: usize) -> Result<&Eth1Node> {
        lookup(&self.eth1s, Role::Eth1, index)
    }

    pub fn get_op_l2(&self, index: usize) -> Result<&OpL2Engine> {
        lookup(&self.op_l2s, Role::OpL2Engine, index)
    }

    pub fn get_op_node(&self, index: usize) -> Result<&OpNode> {
        lookup(&self.op_nodes, Role::OpNode, index)
    }

    pub fn get_batcher(&self, index: usize) -> Result<&BatcherNode> {
        lookup(&self.batchers, Role::OpBatcher, index)
    }

    pub fn get_proposer(&self, index: usize) -> Result<&ProposerNode> {
        lookup(&self.proposers, Role::OpProposer, index)
    }

    pub fn get_contracts(&self, index: usize) -> Result<&OpContracts> {
        lookup(&self.contracts, Role::Contracts, index)
    }

    /// Looks up the i-th node of any role.
    pub fn node(&self, role: Role, index: usize) -> Result<&dyn Node> {
        let node: &dyn Node = match role {
            Role::Eth1 => self.get_eth1(index)?,
            Role::OpL2Engine => self.get_op_l2(index)?,
            Role::OpNode => self.get_op_node(index)?,
            Role::OpBatcher => self.get_batcher(index)?,
            Role::OpProposer => self.get_proposer(index)?,
            Role::Contracts => self.get_contracts(index)?,
        };
        Ok(node)
    }

    /// Kills every container in reverse creation order. Failures are logged
    /// and the remaining containers are still killed; the first failure is
    /// returned. All handles are gone afterwards.
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut first_err = None;
        for (role, container) in self.created.drain(..).rev() {
            if let Err(err) = self.test.kill_client(&container).await {
                warn!(%role, %container, "failed to kill node: {err}");
                first_err.get_or_insert(err);
            }
        }
        self.eth1s = Registry::default();
        self.op_l2s = Registry::default();
        self.op_nodes = Registry::default();
        self.batchers = Registry::default();
        self.proposers = Registry::default();
        self.contracts = Registry::default();

        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
