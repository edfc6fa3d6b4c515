use crate::error::{Error, Result};
use crate::transport::{delete, get_text, post_form, post_multipart};
use crate::types::{ClientDefinition, NodeHandle, NodeParams, SuiteID, TestID, TestResult};
use crate::TestMatcher;
use std::collections::{BTreeMap, HashMap};
use std::env;
use tracing::{debug, info};

pub const HIVE_SIMULATOR: &str = "HIVE_SIMULATOR";
pub const HIVE_TEST_PATTERN: &str = "HIVE_TEST_PATTERN";

/// Wraps the simulation HTTP API provided by hive.
#[derive(Clone, Debug)]
pub struct Simulation {
    pub url: String,
    pub test_matcher: Option<TestMatcher>,
    http: reqwest::Client,
}

impl Simulation {
    /// Looks up the hive host URI using the HIVE_SIMULATOR environment variable.
    /// HIVE_TEST_PATTERN, when set and non empty, selects the suites and tests to run.
    pub fn from_env() -> Result<Self> {
        let url = env::var(HIVE_SIMULATOR)
            .map_err(|_| Error::Config(format!("{HIVE_SIMULATOR} environment variable not set")))?;
        if url.is_empty() {
            return Err(Error::Config(format!(
                "{HIVE_SIMULATOR} environment variable is empty"
            )));
        }

        let test_matcher = match env::var(HIVE_TEST_PATTERN) {
            Ok(pattern) if !pattern.is_empty() => Some(TestMatcher::new(&pattern)?),
            _ => None,
        };

        Ok(Self::new_at(url).with_test_matcher(test_matcher))
    }

    /// Creates a simulation connected to the given API endpoint. Simulators
    /// launched by hive should use [`Simulation::from_env`].
    pub fn new_at(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            test_matcher: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_test_matcher(mut self, test_matcher: Option<TestMatcher>) -> Self {
        self.test_matcher = test_matcher;
        self
    }

    pub async fn start_suite(
        &self,
        name: &str,
        description: &str,
        sim_log: &str,
    ) -> Result<SuiteID> {
        let url = format!("{}/testsuite", self.url);
        let body = post_form(
            &self.http,
            &url,
            &[
                ("name", name),
                ("description", description),
                ("simlog", sim_log),
            ],
        )
        .await?;
        let suite = SuiteID::parse(&body)?;
        info!(%suite, name, "started test suite");
        Ok(suite)
    }

    pub async fn end_suite(&self, test_suite: SuiteID) -> Result<()> {
        let test_suite = test_suite.checked()?;
        let url = format!("{}/testsuite/{}", self.url, test_suite);
        delete(&self.http, &url).await?;
        info!(suite = %test_suite, "ended test suite");
        Ok(())
    }

    /// Starts a new test case, returning the testcase id as a context identifier
    pub async fn start_test(
        &self,
        test_suite: SuiteID,
        name: &str,
        description: &str,
    ) -> Result<TestID> {
        let test_suite = test_suite.checked()?;
        let url = format!("{}/testsuite/{}/test", self.url, test_suite);
        let body = post_form(
            &self.http,
            &url,
            &[("name", name), ("description", description)],
        )
        .await?;
        let test = TestID::parse(&body)?;
        debug!(suite = %test_suite, %test, name, "started test");
        Ok(test)
    }

    /// Finishes the test case. Hive tears down every node of the test when it
    /// receives the results, so this must be called exactly once per test.
    ///
    /// The results are posted rather than sent with DELETE because a DELETE
    /// body is not supported everywhere.
    pub async fn end_test(
        &self,
        test_suite: SuiteID,
        test: TestID,
        summary_result: &TestResult,
        client_results: &HashMap<String, TestResult>,
    ) -> Result<()> {
        let (test_suite, test) = (test_suite.checked()?, test.checked()?);
        let summary = serde_json::to_string(summary_result)?;
        let clients = serde_json::to_string(client_results)?;

        let url = format!("{}/testsuite/{}/test/{}", self.url, test_suite, test);
        post_form(
            &self.http,
            &url,
            &[
                ("summaryresult", summary.as_str()),
                ("clientresults", clients.as_str()),
            ],
        )
        .await?;
        debug!(suite = %test_suite, %test, pass = summary_result.pass, "ended test");
        Ok(())
    }

    /// Starts a new node (or other container) from `params`, uploading its
    /// init files. One parameter must be named CLIENT and name one of the
    /// client types from [`Simulation::client_types`]; the others become
    /// environment variables of the container.
    ///
    /// When hive creates the container but sends no address back the error is
    /// [`Error::NoIpAddress`], which still carries the container id.
    pub async fn start_node(
        &self,
        test_suite: SuiteID,
        test: TestID,
        params: &NodeParams,
    ) -> Result<NodeHandle> {
        let (test_suite, test) = (test_suite.checked()?, test.checked()?);
        params.validate()?;

        let url = format!("{}/testsuite/{}/test/{}/node", self.url, test_suite, test);
        let body = post_multipart(&self.http, &url, &params.params, &params.files).await?;
        let handle = NodeHandle::decode(&body)?;
        debug!(
            container = %handle.container,
            ip = %handle.ip,
            client = params.client_type(),
            "started node"
        );
        Ok(handle)
    }

    /// Starts a pseudo client, which takes no init files. Same contract as
    /// [`Simulation::start_node`].
    pub async fn start_pseudo(
        &self,
        test_suite: SuiteID,
        test: TestID,
        params: &BTreeMap<String, String>,
    ) -> Result<NodeHandle> {
        let (test_suite, test) = (test_suite.checked()?, test.checked()?);
        NodeParams::from(params.clone()).validate()?;

        let url = format!("{}/testsuite/{}/test/{}/pseudo", self.url, test_suite, test);
        let fields: Vec<(&str, &str)> = params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let body = post_form(&self.http, &url, &fields).await?;
        NodeHandle::decode(&body)
    }

    /// Signals to the host that the node is no longer required.
    pub async fn kill_node(&self, test_suite: SuiteID, test: TestID, node: &str) -> Result<()> {
        let (test_suite, test) = (test_suite.checked()?, test.checked()?);
        let url = format!(
            "{}/testsuite/{}/test/{}/node/{}",
            self.url, test_suite, test, node
        );
        delete(&self.http, &url).await?;
        debug!(container = node, "killed node");
        Ok(())
    }

    /// Returns the enode URL of a running client.
    pub async fn client_enode(&self, test_suite: SuiteID, test: TestID, node: &str) -> Result<String> {
        let (test_suite, test) = (test_suite.checked()?, test.checked()?);
        let url = format!(
            "{}/testsuite/{}/test/{}/node/{}",
            self.url, test_suite, test, node
        );
        let body = get_text(&self.http, &url).await?;
        Ok(body.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Returns all client types available to this simulator run. This depends on
    /// both the available client set and the command line filters.
    pub async fn client_types(&self) -> Result<Vec<ClientDefinition>> {
        let url = format!("{}/clients", self.url);
        let body = get_text(&self.http, &url).await?;
        match serde_json::from_str(&body) {
            Ok(clients) => Ok(clients),
            Err(_) => Err(Error::Decode {
                what: "client types",
                body,
            }),
        }
    }
}
