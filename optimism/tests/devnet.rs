mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use common::{start_test, OPTIMISM_CLIENTS};
use hive_optimism::config::{DevnetConfig, RollupConfig};
use hive_optimism::devnet::{
    HIVE_L1_ETH_RPC, HIVE_L2_ENGINE_RPC, HIVE_L2_ETH_RPC, HIVE_ROLLUP_RPC, HIVE_SEQUENCER,
    ROLLUP_CONFIG_FILE,
};
use hive_optimism::nodes::{ExecutionEndpoints, Node, RollupEndpoints};
use hive_optimism::{Devnet, Error, Role};
use hivesim::testing::FakeHive;
use hivesim::types::NodeParams;

async fn devnet(hive: &FakeHive) -> Devnet {
    Devnet::new(start_test(hive).await, DevnetConfig::default()).expect("devnet")
}

fn no_overrides() -> NodeParams {
    NodeParams::default()
}

#[tokio::test]
async fn nodes_are_indexed_per_role() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;

    assert_eq!(devnet.add_eth1(no_overrides()).await.expect("eth1"), 0);
    assert_eq!(devnet.add_op_l2(no_overrides()).await.expect("l2"), 0);
    assert_eq!(devnet.add_eth1(no_overrides()).await.expect("eth1"), 1);
    assert_eq!(devnet.add_op_l2(no_overrides()).await.expect("l2"), 1);

    let first = devnet.get_eth1(0).expect("eth1 0").container().to_string();
    let second = devnet.get_eth1(1).expect("eth1 1").container().to_string();
    assert_ne!(first, second);
    assert_eq!(devnet.get_op_l2(1).expect("l2 1").kind(), "ops-l2");
    assert_eq!(
        devnet.node(Role::Eth1, 1).expect("eth1 1").container(),
        second
    );

    let roles: Vec<Role> = devnet.containers().map(|(role, _)| role).collect();
    assert_eq!(
        roles,
        vec![Role::Eth1, Role::OpL2Engine, Role::Eth1, Role::OpL2Engine]
    );

    let state = hive.state();
    let params = &state.node_requests[0].params;
    assert_eq!(params["CLIENT"], "ops-l1");
    assert_eq!(params["HIVE_L1_CHAIN_ID"], "900");
    assert_eq!(params["HIVE_CLIQUE_PERIOD"], "2");
}

#[tokio::test]
async fn op_nodes_get_endpoints_and_rollup_config() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;

    devnet.add_eth1(no_overrides()).await.expect("eth1");
    devnet.add_op_l2(no_overrides()).await.expect("l2");
    devnet.add_op_l2(no_overrides()).await.expect("l2");
    let sequencer = devnet.add_op_node(0, 0, no_overrides()).await.expect("sequencer");
    let verifier = devnet.add_op_node(0, 1, no_overrides()).await.expect("verifier");
    assert_eq!((sequencer, verifier), (0, 1));

    let l1_rpc = devnet.get_eth1(0).expect("eth1").http_rpc_endpoint();
    let engine = devnet.get_op_l2(1).expect("l2").engine_endpoint();
    assert_eq!(
        devnet.get_op_node(1).expect("op-node").rollup_rpc_endpoint(),
        "http://172.17.0.2:8545"
    );

    let state = hive.state();
    let (seq_request, verifier_request) = (&state.node_requests[3], &state.node_requests[4]);
    assert_eq!(seq_request.params["CLIENT"], "op-node");
    assert_eq!(seq_request.params[HIVE_SEQUENCER], "true");
    assert!(!verifier_request.params.contains_key(HIVE_SEQUENCER));
    assert_eq!(verifier_request.params[HIVE_L1_ETH_RPC], l1_rpc);
    assert_eq!(verifier_request.params[HIVE_L2_ENGINE_RPC], engine);

    let (file_name, content) = &verifier_request.files[ROLLUP_CONFIG_FILE];
    assert_eq!(file_name, "rollup.json");
    let uploaded: RollupConfig = serde_json::from_slice(content).expect("rollup config");
    assert_eq!(uploaded, RollupConfig::default());
    assert_eq!(seq_request.files[ROLLUP_CONFIG_FILE].1, *content);
}

#[tokio::test]
async fn services_point_at_their_dependencies() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;

    devnet.add_eth1(no_overrides()).await.expect("eth1");
    devnet.add_op_l2(no_overrides()).await.expect("l2");
    devnet.add_op_node(0, 0, no_overrides()).await.expect("op-node");
    devnet
        .add_op_batcher(0, 0, 0, NodeParams::default().param("HIVE_BATCHER_NAMESPACE", "b"))
        .await
        .expect("batcher");
    devnet.add_op_proposer(0, 0, 0, no_overrides()).await.expect("proposer");

    assert_eq!(devnet.get_batcher(0).expect("batcher").kind(), "op-batcher");
    assert_eq!(devnet.get_proposer(0).expect("proposer").kind(), "op-proposer");

    let l2_rpc = devnet.get_op_l2(0).expect("l2").http_rpc_endpoint();
    let rollup_rpc = devnet.get_op_node(0).expect("op-node").rollup_rpc_endpoint();
    let state = hive.state();
    for request in &state.node_requests[3..] {
        assert_eq!(request.params[HIVE_L2_ETH_RPC], l2_rpc);
        assert_eq!(request.params[HIVE_ROLLUP_RPC], rollup_rpc);
    }
    assert_eq!(state.node_requests[3].params["HIVE_BATCHER_NAMESPACE"], "b");
}

#[tokio::test]
async fn overrides_replace_defaults() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;

    devnet
        .add_eth1(NodeParams::default().param("HIVE_CLIQUE_PERIOD", "5"))
        .await
        .expect("eth1");
    assert_eq!(hive.state().node_requests[0].params["HIVE_CLIQUE_PERIOD"], "5");
}

#[tokio::test]
async fn missing_dependency_sends_nothing() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;
    devnet.add_eth1(no_overrides()).await.expect("eth1");

    let err = devnet.add_op_node(0, 0, no_overrides()).await.unwrap_err();
    assert!(
        matches!(err, Error::MissingNode { role: Role::OpL2Engine, index: 0 }),
        "got {err:?}"
    );
    let err = devnet.deploy_contracts(3, no_overrides()).await.unwrap_err();
    assert_eq!(err.to_string(), "eth1 node 3 does not exist");
    assert!(devnet.get_op_node(0).is_err());

    assert_eq!(hive.state().node_requests.len(), 1);
}

#[tokio::test]
async fn unreachable_l1_fails_contract_deployment() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    // TEST-NET-1, nothing answers there
    hive.state().node_ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    let config = DevnetConfig {
        reachability_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let mut devnet = Devnet::new(start_test(&hive).await, config).expect("devnet");
    devnet.add_eth1(no_overrides()).await.expect("eth1");

    let err = devnet.deploy_contracts(0, no_overrides()).await.unwrap_err();
    assert!(
        matches!(err, Error::Unreachable { role: Role::Eth1, index: 0, .. }),
        "got {err:?}"
    );
    assert!(devnet.get_contracts(0).is_err());
    assert_eq!(hive.state().node_requests.len(), 1);
}

#[tokio::test]
async fn node_without_address_is_still_shut_down() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;
    devnet.add_eth1(no_overrides()).await.expect("eth1");

    hive.state().omit_node_ip = true;
    let err = devnet.add_op_l2(no_overrides()).await.unwrap_err();
    assert!(matches!(err, Error::Hive(hivesim::Error::NoIpAddress { .. })), "got {err:?}");
    assert!(devnet.get_op_l2(0).is_err());
    assert_eq!(devnet.containers().count(), 2);

    devnet.shutdown().await.expect("shutdown");
    assert!(hive.state().live_nodes().is_empty());
}

#[tokio::test]
async fn shutdown_kills_in_reverse_order() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let mut devnet = devnet(&hive).await;
    devnet.add_eth1(no_overrides()).await.expect("eth1");
    devnet.add_op_l2(no_overrides()).await.expect("l2");
    devnet.add_op_node(0, 0, no_overrides()).await.expect("op-node");

    let mut created: Vec<String> = devnet
        .containers()
        .map(|(_, container)| container.to_string())
        .collect();
    devnet.shutdown().await.expect("shutdown");

    created.reverse();
    assert_eq!(hive.state().killed, created);
    assert_eq!(devnet.containers().count(), 0);
    assert!(devnet.get_eth1(0).is_err());
}

#[tokio::test]
async fn shutdown_continues_past_failures() {
    let hive = FakeHive::start_with_clients(OPTIMISM_CLIENTS).await.expect("fake hive");
    let test = start_test(&hive).await;
    let mut devnet = Devnet::new(test.clone(), DevnetConfig::default()).expect("devnet");
    devnet.add_eth1(no_overrides()).await.expect("eth1");
    devnet.add_op_l2(no_overrides()).await.expect("l2");

    let l2 = devnet.get_op_l2(0).expect("l2").container().to_string();
    test.kill_client(&l2).await.expect("kill l2");

    let err = devnet.shutdown().await.unwrap_err();
    assert!(matches!(err, Error::Hive(hivesim::Error::Protocol { .. })), "got {err:?}");
    assert_eq!(hive.state().killed.len(), 2);
    assert!(hive.state().live_nodes().is_empty());
}
