use std::net::{IpAddr, SocketAddr};

use hivesim::Client;

use crate::rpc::{AdminClient, EthClient, P2PClient, RollupClient};

// These ports are exposed on the docker containers, and accessible via the docker network
// that the hive test runs in. They are container ports, not exposed to the host, so multiple
// containers can use the same port. Some eth1 client definitions hardcode them, others make
// them configurable, these should not be changed.
pub const HTTP_RPC_PORT: u16 = 8545;
pub const WS_RPC_PORT: u16 = 8546;
pub const ENGINE_PORT: u16 = 8551;
/// Same as the default EL RPC port, since hive runs its RPC liveness checks on it.
pub const ROLLUP_RPC_PORT: u16 = 8545;
pub const OPNODE_P2P_PORT: u16 = 9300;

fn endpoint(scheme: &str, ip: IpAddr, port: u16, path: &str) -> String {
    format!("{scheme}://{}{path}", SocketAddr::new(ip, port))
}

/// A node started through hive. The handle does not own the container: the
/// devnet (or the end of the test) tears it down.
pub trait Node {
    fn client(&self) -> &Client;

    fn ip(&self) -> IpAddr {
        self.client().ip
    }

    fn kind(&self) -> &str {
        &self.client().kind
    }

    fn container(&self) -> &str {
        &self.client().container
    }
}

/// Endpoints of an execution layer client.
pub trait ExecutionEndpoints: Node {
    fn http_rpc_endpoint(&self) -> String {
        endpoint("http", self.ip(), HTTP_RPC_PORT, "")
    }

    fn engine_endpoint(&self) -> String {
        endpoint("http", self.ip(), ENGINE_PORT, "")
    }

    fn ws_rpc_endpoint(&self) -> String {
        // left over from older mergenet ws connection problems, clients differ here
        match base_client_name(self.kind()) {
            "besu" => endpoint("ws", self.ip(), WS_RPC_PORT, "/ws"),
            "nethermind" => endpoint("http", self.ip(), WS_RPC_PORT, "/ws"), // upgrade
            _ => endpoint("ws", self.ip(), WS_RPC_PORT, ""),
        }
    }

    fn eth_client(&self) -> EthClient {
        EthClient::new(self.client().rpc.clone())
    }
}

/// Peer management of an execution engine.
pub trait PeerAdmin: Node {
    fn admin_client(&self) -> AdminClient {
        AdminClient::new(self.client().rpc.clone())
    }
}

/// Endpoints of a rollup node.
pub trait RollupEndpoints: Node {
    fn rollup_rpc_endpoint(&self) -> String {
        endpoint("http", self.ip(), ROLLUP_RPC_PORT, "")
    }

    fn rollup_client(&self) -> RollupClient {
        RollupClient::new(self.client().rpc.clone())
    }

    fn p2p_client(&self) -> P2PClient {
        P2PClient::new(self.client().rpc.clone())
    }

    fn p2p_addr(&self) -> String {
        match self.ip() {
            IpAddr::V4(ip) => format!("/ip4/{ip}/tcp/{OPNODE_P2P_PORT}"),
            IpAddr::V6(ip) => format!("/ip6/{ip}/tcp/{OPNODE_P2P_PORT}"),
        }
    }
}

/// Hive client names may carry a variant suffix, like `besu_nightly`.
fn base_client_name(kind: &str) -> &str {
    kind.split_once('_').map_or(kind, |(name, _)| name)
}

macro_rules! node_handle {
    ($(#[$meta:meta])* $name:ident $(: $($capability:ident),+)?) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name {
            client: Client,
        }

        impl $name {
            pub fn new(client: Client) -> Self {
                Self { client }
            }
        }

        impl Node for $name {
            fn client(&self) -> &Client {
                &self.client
            }
        }

        $($(impl $capability for $name {})+)?
    };
}

node_handle!(
    /// L1 execution client.
    Eth1Node: ExecutionEndpoints
);
node_handle!(
    /// L2 execution engine. Same endpoints as an L1 node, plus peer management.
    OpL2Engine: ExecutionEndpoints, PeerAdmin
);
node_handle!(
    /// Rollup node driving an L2 engine.
    OpNode: RollupEndpoints
);
node_handle!(
    /// Container that deployed the L1 contracts.
    OpContracts
);
node_handle!(BatcherNode);
node_handle!(ProposerNode);

#[cfg(test)]
mod tests {
    use super::*;
    use hivesim::types::{SuiteID, TestID, TestResult};
    use hivesim::{Simulation, Suite, Test};
    use jsonrpsee::http_client::HttpClientBuilder;
    use std::net::Ipv4Addr;

    fn client(kind: &str, ip: IpAddr) -> Client {
        Client {
            kind: kind.to_string(),
            container: format!("{kind}-container"),
            ip,
            extra: None,
            rpc: HttpClientBuilder::default()
                .build(format!("http://{}", SocketAddr::new(ip, HTTP_RPC_PORT)))
                .expect("rpc client"),
            test: Test {
                sim: Simulation::new_at("http://127.0.0.1:3000"),
                test_id: TestID(2),
                suite: Suite {
                    name: "optimism p2p".to_string(),
                    description: String::new(),
                    tests: vec![],
                },
                suite_id: SuiteID(1),
                result: TestResult::pass(),
            },
        }
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(172, 17, 0, 3))
    }

    #[test]
    fn execution_endpoints() {
        let node = Eth1Node::new(client("ops-l1", ip()));
        assert_eq!(node.http_rpc_endpoint(), "http://172.17.0.3:8545");
        assert_eq!(node.engine_endpoint(), "http://172.17.0.3:8551");
        assert_eq!(node.ws_rpc_endpoint(), "ws://172.17.0.3:8546");
    }

    #[test]
    fn ws_endpoint_depends_on_client_type() {
        let besu = OpL2Engine::new(client("besu", ip()));
        assert_eq!(besu.ws_rpc_endpoint(), "ws://172.17.0.3:8546/ws");

        let nethermind = OpL2Engine::new(client("nethermind_nightly", ip()));
        assert_eq!(nethermind.ws_rpc_endpoint(), "http://172.17.0.3:8546/ws");

        let geth = OpL2Engine::new(client("op-geth", ip()));
        assert_eq!(geth.ws_rpc_endpoint(), "ws://172.17.0.3:8546");
    }

    #[test]
    fn rollup_endpoints() {
        let node = OpNode::new(client("op-node", ip()));
        assert_eq!(node.rollup_rpc_endpoint(), "http://172.17.0.3:8545");
        assert_eq!(node.p2p_addr(), "/ip4/172.17.0.3/tcp/9300");
        assert_eq!(node.container(), "op-node-container");
    }

    #[test]
    fn ipv6_endpoints_are_bracketed() {
        let node = Eth1Node::new(client("geth", "fd00::5".parse().expect("ip")));
        assert_eq!(node.http_rpc_endpoint(), "http://[fd00::5]:8545");
        let op = OpNode::new(client("op-node", "fd00::5".parse().expect("ip")));
        assert_eq!(op.p2p_addr(), "/ip6/fd00::5/tcp/9300");
    }
}
