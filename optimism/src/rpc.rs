//! Typed JSON-RPC clients for the APIs the optimism nodes expose. Every call is
//! a single request without retries.

use std::collections::BTreeMap;

use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enode::Enode;
use crate::error::{Error, Result};

fn connect(url: &str) -> Result<HttpClient> {
    Ok(HttpClientBuilder::default().build(url)?)
}

fn parse_quantity(method: &'static str, value: &str) -> Result<u64> {
    let invalid = || Error::InvalidResponse {
        method,
        value: value.to_string(),
    };
    let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
    u64::from_str_radix(digits, 16).map_err(|_| invalid())
}

/// The `eth` namespace of an execution client.
#[derive(Clone, Debug)]
pub struct EthClient {
    rpc: HttpClient,
}

impl EthClient {
    pub fn new(rpc: HttpClient) -> Self {
        Self { rpc }
    }

    pub fn connect(url: &str) -> Result<Self> {
        connect(url).map(Self::new)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id: String = self.rpc.request("eth_chainId", rpc_params![]).await?;
        parse_quantity("eth_chainId", &id)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number: String = self.rpc.request("eth_blockNumber", rpc_params![]).await?;
        parse_quantity("eth_blockNumber", &number)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockId {
    pub hash: String,
    pub number: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1BlockRef {
    pub hash: String,
    pub number: u64,
    pub parent_hash: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2BlockRef {
    pub hash: String,
    pub number: u64,
    pub parent_hash: String,
    pub timestamp: u64,
    #[serde(rename = "l1origin")]
    pub l1_origin: BlockId,
    pub sequence_number: u64,
}

/// What an op-node reports about its view of L1 and L2, as returned by
/// `optimism_syncStatus`. Two nodes are in sync when these are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub current_l1: L1BlockRef,
    #[serde(default)]
    pub current_l1_finalized: L1BlockRef,
    pub head_l1: L1BlockRef,
    pub safe_l1: L1BlockRef,
    pub finalized_l1: L1BlockRef,
    pub unsafe_l2: L2BlockRef,
    pub safe_l2: L2BlockRef,
    pub finalized_l2: L2BlockRef,
}

/// The rollup node API of an op-node.
#[derive(Clone, Debug)]
pub struct RollupClient {
    rpc: HttpClient,
}

impl RollupClient {
    pub fn new(rpc: HttpClient) -> Self {
        Self { rpc }
    }

    pub fn connect(url: &str) -> Result<Self> {
        connect(url).map(Self::new)
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        Ok(self
            .rpc
            .request("optimism_syncStatus", rpc_params![])
            .await?)
    }

    pub async fn version(&self) -> Result<String> {
        Ok(self.rpc.request("optimism_version", rpc_params![]).await?)
    }
}

/// Peer as described by the op-node p2p API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PPeerInfo {
    #[serde(rename = "peerID")]
    pub peer_id: String,
    #[serde(rename = "nodeID", default)]
    pub node_id: String,
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(rename = "ENR", default)]
    pub enr: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub connectedness: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDump {
    pub total_connected: u64,
    #[serde(default)]
    pub peers: BTreeMap<String, P2PPeerInfo>,
}

/// The `opp2p` namespace of an op-node.
#[derive(Clone, Debug)]
pub struct P2PClient {
    rpc: HttpClient,
}

impl P2PClient {
    pub fn new(rpc: HttpClient) -> Self {
        Self { rpc }
    }

    pub fn connect(url: &str) -> Result<Self> {
        connect(url).map(Self::new)
    }

    pub async fn self_info(&self) -> Result<P2PPeerInfo> {
        Ok(self.rpc.request("opp2p_self", rpc_params![]).await?)
    }

    pub async fn peers(&self, connected: bool) -> Result<PeerDump> {
        Ok(self.rpc.request("opp2p_peers", rpc_params![connected]).await?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePorts {
    pub discovery: u16,
    pub listener: u16,
}

/// Answer of `admin_nodeInfo`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub enode: String,
    #[serde(default)]
    pub enr: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ports: NodePorts,
    #[serde(rename = "listenAddr", default)]
    pub listen_addr: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerNetwork {
    pub local_address: String,
    pub remote_address: String,
    pub inbound: bool,
    pub trusted: bool,
    #[serde(rename = "static")]
    pub is_static: bool,
}

/// One entry of `admin_peers`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(default)]
    pub enode: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub network: PeerNetwork,
}

/// Only the hash of pooled transactions matters for gossip tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcTransactionHash {
    pub hash: String,
}

/// `txpool_content`: pool ("pending"/"queued") to sender to nonce.
pub type TxPoolContent = BTreeMap<String, BTreeMap<String, BTreeMap<String, RpcTransactionHash>>>;

/// The `admin` and `txpool` namespaces of an L2 execution engine.
#[derive(Clone, Debug)]
pub struct AdminClient {
    rpc: HttpClient,
}

impl AdminClient {
    pub fn new(rpc: HttpClient) -> Self {
        Self { rpc }
    }

    pub fn connect(url: &str) -> Result<Self> {
        connect(url).map(Self::new)
    }

    pub async fn node_info(&self) -> Result<NodeInfo> {
        Ok(self.rpc.request("admin_nodeInfo", rpc_params![]).await?)
    }

    pub async fn peers(&self) -> Result<Vec<PeerInfo>> {
        Ok(self.rpc.request("admin_peers", rpc_params![]).await?)
    }

    pub async fn add_peer(&self, enode: &str) -> Result<bool> {
        Ok(self.rpc.request("admin_addPeer", rpc_params![enode]).await?)
    }

    pub async fn txpool_content(&self) -> Result<TxPoolContent> {
        Ok(self.rpc.request("txpool_content", rpc_params![]).await?)
    }

    /// Asks `neighbor` for its enode and adds it as a peer. Nothing is added
    /// when the neighbor's enode does not parse.
    pub async fn connect_peer(&self, neighbor: &AdminClient) -> Result<()> {
        let info = neighbor.node_info().await?;
        let enode = Enode::parse(&info.enode)?;
        let added = self.add_peer(&info.enode).await?;
        debug!(peer = %enode.id, ip = %enode.ip, added, "added peer");
        Ok(())
    }
}
