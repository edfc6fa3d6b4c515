use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use async_trait::async_trait;
use dyn_clone::DynClone;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use tokio::task::JoinError;
use tracing::{error, info};

use crate::error::Result;
use crate::types::{ClientDefinition, NodeHandle, NodeParams, SuiteID, TestID, TestResult};
use crate::utils::extract_test_results;
use crate::Simulation;

/// Port hive uses for RPC and liveness checks of every client.
pub const CLIENT_RPC_PORT: u16 = 8545;

/// Body of a [`TestSpec`]. Write these with [`crate::dyn_async`].
pub type AsyncTestFunc =
    fn(&mut Test, Option<Client>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

pub type AsyncNClientsTestFunc = fn(Vec<Client>) -> Pin<Box<dyn Future<Output = ()> + Send>>;

#[async_trait]
pub trait Testable: DynClone + Send + Sync {
    async fn run_test(&self, simulation: Simulation, suite_id: SuiteID, suite: Suite) -> Result<()>;
}

impl Debug for dyn Testable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Testable")
    }
}

dyn_clone::clone_trait_object!(Testable);
/// Description of a test suite
#[derive(Clone, Debug)]
pub struct Suite {
    pub name: String,
    pub description: String,
    pub tests: Vec<Box<dyn Testable>>,
}

impl Suite {
    pub fn add<T: Testable + 'static>(&mut self, test: T) {
        self.tests.push(Box::new(test))
    }
}

/// Represents a running client.
#[derive(Debug, Clone)]
pub struct Client {
    pub kind: String,
    pub container: String,
    pub ip: IpAddr,
    pub extra: Option<String>,
    pub rpc: HttpClient,
    pub test: Test,
}

impl Client {
    fn new(kind: String, handle: NodeHandle, test: &Test) -> Result<Self> {
        let rpc = HttpClientBuilder::default()
            .build(format!("http://{}:{}", handle.ip, CLIENT_RPC_PORT))?;
        Ok(Self {
            kind,
            container: handle.container,
            ip: handle.ip,
            extra: handle.extra,
            rpc,
            test: test.clone(),
        })
    }

    /// Returns the enode URL hive reports for this client.
    pub async fn enode(&self) -> Result<String> {
        self.test.client_enode(&self.container).await
    }
}

#[derive(Clone, Debug)]
pub struct TestRun {
    pub suite_id: SuiteID,
    pub suite: Suite,
    pub name: String,
    pub desc: String,
}

/// A running test
#[derive(Clone, Debug)]
pub struct Test {
    pub sim: Simulation,
    pub test_id: TestID,
    pub suite: Suite,
    pub suite_id: SuiteID,
    pub result: TestResult,
}

impl Test {
    pub async fn start_client(
        &self,
        client_type: String,
        environment: Option<HashMap<String, String>>,
    ) -> Result<Client> {
        let params = environment
            .unwrap_or_default()
            .into_iter()
            .fold(NodeParams::new(client_type), |params, (key, value)| {
                params.param(key, value)
            });
        self.start_client_with(&params).await
    }

    /// Starts a client from explicit parameters, uploading its init files.
    pub async fn start_client_with(&self, params: &NodeParams) -> Result<Client> {
        let kind = params.client_type().unwrap_or_default().to_string();
        let handle = self
            .sim
            .start_node(self.suite_id, self.test_id, params)
            .await?;
        Client::new(kind, handle, self)
    }

    pub async fn start_pseudo(&self, params: &BTreeMap<String, String>) -> Result<Client> {
        let kind = NodeParams::from(params.clone())
            .client_type()
            .unwrap_or_default()
            .to_string();
        let handle = self
            .sim
            .start_pseudo(self.suite_id, self.test_id, params)
            .await?;
        Client::new(kind, handle, self)
    }

    pub async fn kill_client(&self, container: &str) -> Result<()> {
        self.sim
            .kill_node(self.suite_id, self.test_id, container)
            .await
    }

    pub async fn client_enode(&self, container: &str) -> Result<String> {
        self.sim
            .client_enode(self.suite_id, self.test_id, container)
            .await
    }

    /// Runs a subtest of this test.
    pub async fn run(&self, spec: impl Testable) -> Result<()> {
        spec.run_test(self.sim.clone(), self.suite_id, self.suite.clone())
            .await
    }
}

/// A single test case. `run` gets the running test and, when set, `client`.
#[derive(Clone)]
pub struct TestSpec {
    pub name: String,
    /// Shown in the hive UI.
    pub description: String,
    /// Run even when the name does not match the test pattern.
    pub always_run: bool,
    pub run: AsyncTestFunc,
    pub client: Option<Client>,
}

impl TestSpec {
    fn selected(&self, simulation: &Simulation, suite: &Suite) -> bool {
        selected(simulation, suite, &self.name, self.always_run)
    }
}

fn selected(simulation: &Simulation, suite: &Suite, name: &str, always_run: bool) -> bool {
    match &simulation.test_matcher {
        Some(test_match) => always_run || test_match.match_test(&suite.name, name),
        None => true,
    }
}

#[async_trait]
impl Testable for TestSpec {
    async fn run_test(&self, simulation: Simulation, suite_id: SuiteID, suite: Suite) -> Result<()> {
        if !self.selected(&simulation, &suite) {
            return Ok(());
        }

        let test_run = TestRun {
            suite_id,
            suite,
            name: self.name.to_owned(),
            desc: self.description.to_owned(),
        };

        run_test(simulation, test_run, self.client.clone(), self.run).await
    }
}

impl TestRun {
    /// Registers the test case on hive and returns the handle its body runs with.
    async fn start(&self, host: &Simulation) -> Result<Test> {
        let test_id = host
            .start_test(self.suite_id, &self.name, &self.desc)
            .await?;
        Ok(Test {
            sim: host.clone(),
            test_id,
            suite: self.suite.clone(),
            suite_id: self.suite_id,
            result: TestResult::pass(),
        })
    }

    /// Reports how the body task ended. This is the only place a test case is
    /// ended, so it happens once per started test.
    async fn finish(&self, test: &Test, outcome: std::result::Result<(), JoinError>) -> Result<()> {
        let result = extract_test_results(outcome);
        if result.pass {
            info!(test = %self.name, "test passed");
        } else {
            error!(test = %self.name, details = %result.details, "test failed");
        }
        test.sim
            .end_test(test.suite_id, test.test_id, &result, &HashMap::new())
            .await
    }
}

/// Registers the test, runs `func` in its own task and ends the test with the
/// outcome. The test is ended exactly once, also when `func` panics.
pub async fn run_test(
    host: Simulation,
    run: TestRun,
    client: Option<Client>,
    func: AsyncTestFunc,
) -> Result<()> {
    let test = run.start(&host).await?;
    let mut body_test = test.clone();
    let outcome = tokio::spawn(async move { func(&mut body_test, client).await }).await;
    run.finish(&test, outcome).await
}

/// A test case that runs against one freshly started client per entry of
/// `clients`.
#[derive(Clone)]
pub struct NClientTestSpec {
    pub name: String,
    pub description: String,
    pub always_run: bool,
    pub run: AsyncNClientsTestFunc,
    /// Environment per client, in the order of `clients`.
    pub environments: Option<Vec<Option<HashMap<String, String>>>>,
    pub clients: Vec<ClientDefinition>,
}

#[async_trait]
impl Testable for NClientTestSpec {
    async fn run_test(&self, simulation: Simulation, suite_id: SuiteID, suite: Suite) -> Result<()> {
        if !selected(&simulation, &suite, &self.name, self.always_run) {
            return Ok(());
        }

        let test_run = TestRun {
            suite_id,
            suite,
            name: self.name.to_owned(),
            desc: self.description.to_owned(),
        };

        run_n_client_test(
            simulation,
            test_run,
            self.environments.to_owned(),
            self.clients.to_owned(),
            self.run,
        )
        .await
    }
}

/// Starts one client per definition, with the matching environment, and
/// hands them all to `func`. A client that fails to start fails the test.
async fn run_n_client_test(
    host: Simulation,
    run: TestRun,
    environments: Option<Vec<Option<HashMap<String, String>>>>,
    clients: Vec<ClientDefinition>,
    func: AsyncNClientsTestFunc,
) -> Result<()> {
    let test = run.start(&host).await?;
    let body_test = test.clone();
    let outcome = tokio::spawn(async move {
        let environments = environments.unwrap_or_else(|| vec![None; clients.len()]);
        let mut started = Vec::with_capacity(clients.len());
        for (definition, environment) in clients.into_iter().zip(environments) {
            match body_test.start_client(definition.name.clone(), environment).await {
                Ok(client) => started.push(client),
                Err(err) => panic!("failed to start client {}: {err}", definition.name),
            }
        }
        func(started).await;
    })
    .await;
    run.finish(&test, outcome).await
}

/// Runs every selected suite: starts it on hive, runs its tests in order and
/// ends it. A suite is ended even when one of its tests could not be run.
pub async fn run_suite(host: Simulation, suites: Vec<Suite>) -> Result<()> {
    for suite in suites {
        if let Some(test_match) = &host.test_matcher {
            if !test_match.match_test(&suite.name, "") {
                continue;
            }
        }

        let suite_id = host
            .start_suite(&suite.name, &suite.description, "")
            .await?;

        let mut outcome = Ok(());
        for test in &suite.tests {
            if let Err(err) = test.run_test(host.clone(), suite_id, suite.clone()).await {
                error!(suite = %suite.name, "failed to run test: {err}");
                outcome = Err(err);
                break;
            }
        }

        host.end_suite(suite_id).await?;
        outcome?;
    }
    Ok(())
}
