use std::sync::Arc;
use std::time::Duration;

use hive_optimism::nodes::RollupEndpoints;
use hive_optimism::rpc::SyncStatus;
use hive_optimism::{ConsistencyMonitor, Devnet, DevnetConfig, StatusSource};
use hivesim::types::NodeParams;
use hivesim::{dyn_async, run_suite, Client, Simulation, Suite, Test, TestSpec};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut suite = Suite {
        name: "optimism p2p".to_string(),
        description: "This suite runs the P2P tests".to_string(),
        tests: vec![],
    };

    suite.add(TestSpec {
        name: "simple p2p testnet".to_string(),
        description: "This test runs a testnet with P2P set up".to_string(),
        always_run: false,
        run: run_p2p_tests,
        client: None,
    });

    let sim = Simulation::from_env()?;
    run_suite(sim, vec![suite]).await?;
    Ok(())
}

dyn_async! {
    async fn run_p2p_tests<'a>(test: &'a mut Test, _client: Option<Client>) {
        let mut devnet = match Devnet::new(test.clone(), DevnetConfig::default()) {
            Ok(devnet) => devnet,
            Err(err) => panic!("failed to create devnet: {err}"),
        };

        let result = simple_p2p_testnet(&mut devnet).await;
        if let Err(err) = devnet.shutdown().await {
            warn!("devnet shutdown: {err}");
        }
        if let Err(err) = result {
            panic!("{err:#}");
        }
    }
}

/// One sequencer and two verifiers, each op-node on its own L2 engine, must
/// report the same sync status for three sequence windows.
async fn simple_p2p_testnet(devnet: &mut Devnet) -> anyhow::Result<()> {
    let eth1 = devnet.add_eth1(NodeParams::default()).await?;
    devnet.deploy_contracts(eth1, NodeParams::default()).await?;

    // sequencer stack
    let seq_engine = devnet.add_op_l2(NodeParams::default()).await?;
    let seq = devnet
        .add_op_node(eth1, seq_engine, NodeParams::default())
        .await?;
    devnet
        .add_op_batcher(eth1, seq_engine, seq, NodeParams::default())
        .await?;
    devnet
        .add_op_proposer(eth1, seq_engine, seq, NodeParams::default())
        .await?;

    let mut verifiers = Vec::new();
    for _ in 0..2 {
        let engine = devnet.add_op_l2(NodeParams::default()).await?;
        verifiers.push(
            devnet
                .add_op_node(eth1, engine, NodeParams::default())
                .await?,
        );
    }

    // give the verifiers time to sync up
    tokio::time::sleep(Duration::from_secs(10)).await;

    let mut monitor = ConsistencyMonitor::<SyncStatus>::new();
    let watched = [
        ("sequencer", seq),
        ("verifier-A", verifiers[0]),
        ("verifier-B", verifiers[1]),
    ];
    for (name, index) in watched {
        let source: Arc<dyn StatusSource<SyncStatus>> =
            Arc::new(devnet.get_op_node(index)?.rollup_client());
        monitor = monitor.watch(name, source);
    }
    let monitor = monitor.start();

    let run_duration = devnet.config().run_duration();
    info!(?run_duration, "checking that the op-nodes stay in sync");
    tokio::time::sleep(run_duration).await;

    let report = monitor.stop().await?;
    info!(ticks = report.ticks, "sync checks done");
    report.into_result()?;
    Ok(())
}
