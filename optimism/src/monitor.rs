//! Background check that a set of nodes agree with each other while a
//! scenario runs.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::rpc::{RollupClient, SyncStatus};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(4);
/// Shortest polling period, tokio intervals cannot be zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Something the monitor can ask for its current state.
#[async_trait]
pub trait StatusSource<S>: Send + Sync {
    async fn status(&self) -> Result<S>;
}

#[async_trait]
impl StatusSource<SyncStatus> for RollupClient {
    async fn status(&self) -> Result<SyncStatus> {
        self.sync_status().await
    }
}

/// Two adjacent sources that disagreed on one tick. Statuses are kept in
/// their debug form; `None` means the query failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub tick: u64,
    pub left: String,
    pub right: String,
    pub left_status: Option<String>,
    pub right_status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub ticks: u64,
    pub mismatches: Vec<Mismatch>,
}

impl MonitorReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn into_result(self) -> Result<Self> {
        match self.mismatches.first() {
            None => Ok(self),
            Some(first) => Err(Error::Inconsistent(format!(
                "{} mismatches in {} ticks, first at tick {}: {} and {} should be synced",
                self.mismatches.len(),
                self.ticks,
                first.tick,
                first.left,
                first.right
            ))),
        }
    }
}

type Sources<S> = Vec<(String, Arc<dyn StatusSource<S>>)>;

/// Polls every bound source on a fixed interval and compares each source
/// with the next one.
pub struct ConsistencyMonitor<S> {
    interval: Duration,
    query_timeout: Duration,
    sources: Sources<S>,
}

impl<S> Default for ConsistencyMonitor<S> {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            sources: Vec::new(),
        }
    }
}

impl<S> ConsistencyMonitor<S>
where
    S: PartialEq + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Periods below [`MIN_INTERVAL`] are raised to it.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn watch(mut self, name: impl Into<String>, source: Arc<dyn StatusSource<S>>) -> Self {
        self.sources.push((name.into(), source));
        self
    }

    /// Spawns the polling loop. The first tick happens one interval from now.
    pub fn start(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            self.sources,
            self.interval,
            self.query_timeout,
            cancel.clone(),
        ));
        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }
}

async fn query<S>(name: &str, source: &dyn StatusSource<S>, timeout: Duration) -> Option<S> {
    match time::timeout(timeout, source.status()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            warn!(node = name, "failed to get status: {err}");
            None
        }
        Err(_) => {
            warn!(node = name, ?timeout, "status query timed out");
            None
        }
    }
}

async fn run<S>(
    sources: Sources<S>,
    interval: Duration,
    query_timeout: Duration,
    cancel: CancellationToken,
) -> MonitorReport
where
    S: PartialEq + Debug + Send + 'static,
{
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = MonitorReport::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        report.ticks += 1;

        // a started tick always completes, bounded by one query timeout
        let statuses = join_all(
            sources
                .iter()
                .map(|(name, source)| query(name, source.as_ref(), query_timeout)),
        )
        .await;

        for (index, pair) in statuses.windows(2).enumerate() {
            if pair[0] == pair[1] {
                continue;
            }
            let (left, right) = (&sources[index].0, &sources[index + 1].0);
            error!(
                tick = report.ticks,
                left = ?pair[0],
                right = ?pair[1],
                "{left} and {right} should be synced"
            );
            report.mismatches.push(Mismatch {
                tick: report.ticks,
                left: left.clone(),
                right: right.clone(),
                left_status: pair[0].as_ref().map(|s| format!("{s:?}")),
                right_status: pair[1].as_ref().map(|s| format!("{s:?}")),
            });
        }
    }

    info!(ticks = report.ticks, "exiting sync checking loop");
    report
}

/// A running monitor. Dropping the handle cancels the loop without waiting
/// for it.
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<MonitorReport>>,
}

impl MonitorHandle {
    /// Asks the loop to stop. No tick starts after the loop observed this.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the loop to exit, which only happens once it was cancelled.
    pub async fn join(mut self) -> std::result::Result<MonitorReport, JoinError> {
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(MonitorReport::default()),
        }
    }

    pub async fn stop(self) -> std::result::Result<MonitorReport, JoinError> {
        self.cancel();
        self.join().await
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
