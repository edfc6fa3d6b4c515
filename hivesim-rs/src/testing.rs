//! An in-process stand-in for the hive simulation API, for tests of code that
//! talks to hive. It keeps the suite/test/node hierarchy in memory and answers
//! like hive does: integers for suites and tests, `id@ip@extra` for nodes and
//! 404 for anything that has ended or never existed.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::types::TestResult;
use crate::Simulation;

/// A node creation request as seen by the fake.
#[derive(Clone, Debug, Default)]
pub struct NodeRequest {
    pub suite: u32,
    pub test: u32,
    pub pseudo: bool,
    pub params: BTreeMap<String, String>,
    /// Upload name to (file name, content).
    pub files: BTreeMap<String, (String, Vec<u8>)>,
}

/// Results posted when a test ended.
#[derive(Clone, Debug)]
pub struct EndedTest {
    pub summary: TestResult,
    pub clients: HashMap<String, TestResult>,
}

#[derive(Debug)]
pub struct FakeState {
    next_id: u32,
    suites: HashMap<u32, String>,
    tests: HashMap<(u32, u32), String>,
    nodes: BTreeMap<String, (u32, u32)>,
    pub clients: Vec<String>,
    pub node_requests: Vec<NodeRequest>,
    pub ended_tests: BTreeMap<(u32, u32), EndedTest>,
    pub killed: Vec<String>,
    /// Address handed to new nodes.
    pub node_ip: IpAddr,
    /// When set, the node endpoints answer with only the container id.
    pub omit_node_ip: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_id: 0,
            suites: HashMap::new(),
            tests: HashMap::new(),
            nodes: BTreeMap::new(),
            clients: Vec::new(),
            node_requests: Vec::new(),
            ended_tests: BTreeMap::new(),
            killed: Vec::new(),
            node_ip: IpAddr::V4(Ipv4Addr::new(172, 17, 0, 2)),
            omit_node_ip: false,
        }
    }
}

impl FakeState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn test_live(&self, suite: u32, test: u32) -> bool {
        self.suites.contains_key(&suite) && self.tests.contains_key(&(suite, test))
    }

    pub fn live_nodes(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }
}

/// A running fake orchestrator. The server stops when this is dropped.
pub struct FakeHive {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
    task: JoinHandle<()>,
}

impl FakeHive {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_clients(&["geth"]).await
    }

    pub async fn start_with_clients(clients: &[&str]) -> std::io::Result<Self> {
        let state = Arc::new(Mutex::new(FakeState {
            clients: clients.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/clients", get(list_clients))
            .route("/testsuite", post(start_suite))
            .route("/testsuite/{suite}", axum::routing::delete(end_suite))
            .route("/testsuite/{suite}/test", post(start_test))
            .route("/testsuite/{suite}/test/{test}", post(end_test))
            .route("/testsuite/{suite}/test/{test}/node", post(start_node))
            .route("/testsuite/{suite}/test/{test}/pseudo", post(start_pseudo))
            .route(
                "/testsuite/{suite}/test/{test}/node/{node}",
                get(node_enode).delete(kill_node),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, task })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn simulation(&self) -> Simulation {
        Simulation::new_at(self.url())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for FakeHive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type Shared = State<Arc<Mutex<FakeState>>>;

fn lock(state: &Arc<Mutex<FakeState>>) -> MutexGuard<'_, FakeState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("{what} not found")).into_response()
}

async fn list_clients(State(state): Shared) -> Json<Vec<String>> {
    Json(lock(&state).clients.clone())
}

async fn start_suite(State(state): Shared, Form(form): Form<HashMap<String, String>>) -> Response {
    let Some(name) = form.get("name") else {
        return (StatusCode::BAD_REQUEST, "missing name").into_response();
    };
    let mut state = lock(&state);
    let id = state.next_id();
    state.suites.insert(id, name.clone());
    id.to_string().into_response()
}

async fn end_suite(State(state): Shared, Path(suite): Path<u32>) -> Response {
    let mut state = lock(&state);
    if state.suites.remove(&suite).is_none() {
        return not_found("test suite");
    }
    state.tests.retain(|(s, _), _| *s != suite);
    state.nodes.retain(|_, (s, _)| *s != suite);
    StatusCode::OK.into_response()
}

async fn start_test(
    State(state): Shared,
    Path(suite): Path<u32>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = lock(&state);
    if !state.suites.contains_key(&suite) {
        return not_found("test suite");
    }
    let id = state.next_id();
    let name = form.get("name").cloned().unwrap_or_default();
    state.tests.insert((suite, id), name);
    id.to_string().into_response()
}

async fn end_test(
    State(state): Shared,
    Path((suite, test)): Path<(u32, u32)>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let summary = form
        .get("summaryresult")
        .and_then(|raw| serde_json::from_str::<TestResult>(raw).ok());
    let clients = form
        .get("clientresults")
        .and_then(|raw| serde_json::from_str::<HashMap<String, TestResult>>(raw).ok());
    let (Some(summary), Some(clients)) = (summary, clients) else {
        return (StatusCode::BAD_REQUEST, "invalid test results").into_response();
    };

    let mut state = lock(&state);
    if state.tests.remove(&(suite, test)).is_none() {
        return not_found("test case");
    }
    state.nodes.retain(|_, owner| *owner != (suite, test));
    state
        .ended_tests
        .insert((suite, test), EndedTest { summary, clients });
    StatusCode::OK.into_response()
}

fn node_reply(state: &mut FakeState, request: NodeRequest) -> Response {
    if !state.test_live(request.suite, request.test) {
        return not_found("test case");
    }
    let known_client = request
        .params
        .get("CLIENT")
        .is_some_and(|client| state.clients.contains(client));
    if !known_client {
        return (StatusCode::BAD_REQUEST, "unknown client type").into_response();
    }
    let container = format!("container{}", state.next_id());
    state
        .nodes
        .insert(container.clone(), (request.suite, request.test));
    state.node_requests.push(request);
    if state.omit_node_ip {
        container.into_response()
    } else {
        format!("{container}@{}@02:42:ac:11:00:02", state.node_ip).into_response()
    }
}

async fn start_node(
    State(state): Shared,
    Path((suite, test)): Path<(u32, u32)>,
    mut multipart: Multipart,
) -> Response {
    let mut request = NodeRequest {
        suite,
        test,
        ..Default::default()
    };
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let Ok(content) = field.bytes().await else {
            return (StatusCode::BAD_REQUEST, "unreadable field").into_response();
        };
        match file_name {
            Some(file_name) => {
                request.files.insert(name, (file_name, content.to_vec()));
            }
            None => {
                request
                    .params
                    .insert(name, String::from_utf8_lossy(&content).into_owned());
            }
        }
    }
    node_reply(&mut lock(&state), request)
}

async fn start_pseudo(
    State(state): Shared,
    Path((suite, test)): Path<(u32, u32)>,
    Form(params): Form<BTreeMap<String, String>>,
) -> Response {
    let request = NodeRequest {
        suite,
        test,
        pseudo: true,
        params,
        files: BTreeMap::new(),
    };
    node_reply(&mut lock(&state), request)
}

async fn kill_node(
    State(state): Shared,
    Path((suite, test, node)): Path<(u32, u32, String)>,
) -> Response {
    let mut state = lock(&state);
    match state.nodes.get(&node) {
        Some(owner) if *owner == (suite, test) => {
            state.nodes.remove(&node);
            state.killed.push(node);
            StatusCode::OK.into_response()
        }
        _ => not_found("node"),
    }
}

async fn node_enode(
    State(state): Shared,
    Path((suite, test, node)): Path<(u32, u32, String)>,
) -> Response {
    let state = lock(&state);
    match state.nodes.get(&node) {
        Some(owner) if *owner == (suite, test) => format!(
            "enode://{}@{}:30303\r\n",
            "ab".repeat(64),
            state.node_ip
        )
        .into_response(),
        _ => not_found("node"),
    }
}
