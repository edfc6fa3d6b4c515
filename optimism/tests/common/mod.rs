#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use hivesim::testing::FakeHive;
use hivesim::types::TestResult;
use hivesim::{Suite, Test};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Default)]
struct RpcState {
    results: HashMap<String, Value>,
    calls: Vec<(String, Value)>,
}

/// A JSON-RPC endpoint answering every method with a canned result.
pub struct FakeRpc {
    addr: SocketAddr,
    state: Arc<Mutex<RpcState>>,
    task: JoinHandle<()>,
}

impl FakeRpc {
    pub async fn start(results: &[(&str, Value)]) -> Self {
        let state = Arc::new(Mutex::new(RpcState {
            results: results
                .iter()
                .map(|(method, result)| (method.to_string(), result.clone()))
                .collect(),
            calls: Vec::new(),
        }));
        let app = Router::new()
            .route("/", post(handle))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Methods called so far with their params, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().expect("rpc state").calls.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }
}

impl Drop for FakeRpc {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(State(state): State<Arc<Mutex<RpcState>>>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let id = request["id"].clone();

    let mut state = state.lock().expect("rpc state");
    state.calls.push((method.clone(), params));
    Json(match state.results.get(&method) {
        Some(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        None => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": format!("the method {method} does not exist") },
        }),
    })
}

pub const OPTIMISM_CLIENTS: &[&str] = &[
    "ops-l1",
    "ops-l2",
    "op-node",
    "op-batcher",
    "op-proposer",
    "ops-contracts",
];

/// Opens a suite and a test on `hive` and returns the running test.
pub async fn start_test(hive: &FakeHive) -> Test {
    let sim = hive.simulation();
    let suite_id = sim
        .start_suite("optimism p2p", "", "")
        .await
        .expect("start suite");
    let test_id = sim
        .start_test(suite_id, "simple p2p testnet", "")
        .await
        .expect("start test");
    Test {
        sim,
        test_id,
        suite: Suite {
            name: "optimism p2p".to_string(),
            description: String::new(),
            tests: vec![],
        },
        suite_id,
        result: TestResult::pass(),
    }
}
