//! Tick scheduler for the [`SyncOrchestrator`].
//!
//! The driver owns the orchestrator on a single task and feeds it commands from
//! a channel plus an optional polling interval. Incremental updates run as one
//! job per granularity, with at most one job per granularity in flight; a tick
//! skips granularities whose previous job has not finished, so a stalled fetch
//! holds back only its own granularity while commands keep being served.
//!
//! A symbol load is exclusive. A symbol change, reset or shutdown arriving while
//! it runs cancels it; any other command waits for it to finish. Tick jobs of a
//! torn-down symbol are dropped and their results are never applied.

use crate::application::sync::orchestrator::{
    GranularityOutcome, GranularityResult, SyncOrchestrator, SyncReport,
};
use crate::domain::errors::SyncError;
use crate::domain::market::granularity::Granularity;
use crate::domain::market::signal::SignalGauge;
use crate::domain::sync::SyncPhase;
use anyhow::{Context, Result};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum SyncCommand {
    SelectSymbol(String),
    SwitchGranularity(Granularity),
    /// Run one incremental update now
    Tick,
    Reset,
    Status(oneshot::Sender<SyncStatus>),
    Shutdown,
}

impl SyncCommand {
    fn supersedes_in_flight(&self) -> bool {
        matches!(
            self,
            SyncCommand::SelectSymbol(_) | SyncCommand::Reset | SyncCommand::Shutdown
        )
    }
}

/// Point-in-time view of the engine for the host UI
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub symbol: Option<String>,
    pub displayed: Granularity,
    pub window_lens: Vec<(Granularity, usize)>,
    pub gauges: Vec<SignalGauge>,
}

impl SyncStatus {
    fn capture(orchestrator: &SyncOrchestrator) -> Self {
        Self {
            phase: orchestrator.phase(),
            symbol: orchestrator.symbol().map(str::to_string),
            displayed: orchestrator.displayed(),
            window_lens: Granularity::all()
                .into_iter()
                .map(|g| (g, orchestrator.state(g).map_or(0, |s| s.window().len())))
                .collect(),
            gauges: orchestrator.signal_summary(),
        }
    }

    pub fn window_len(&self, granularity: Granularity) -> usize {
        self.window_lens
            .iter()
            .find(|(g, _)| *g == granularity)
            .map_or(0, |(_, len)| *len)
    }
}

pub struct SyncDriver {
    orchestrator: SyncOrchestrator,
    cmd_rx: mpsc::Receiver<SyncCommand>,
    poll_interval: Option<Duration>,
    pending: VecDeque<SyncCommand>,
}

impl SyncDriver {
    pub fn new(
        orchestrator: SyncOrchestrator,
        poll_interval: Option<Duration>,
    ) -> (Self, SyncHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let driver = Self {
            orchestrator,
            cmd_rx,
            poll_interval,
            pending: VecDeque::new(),
        };
        (driver, SyncHandle { cmd_tx })
    }

    /// Starts the driver on its own task
    pub fn spawn(
        orchestrator: SyncOrchestrator,
        poll_interval: Option<Duration>,
    ) -> (SyncHandle, JoinHandle<SyncOrchestrator>) {
        let (driver, handle) = Self::new(orchestrator, poll_interval);
        (handle, tokio::spawn(driver.run()))
    }

    /// Runs until shutdown or until every handle is dropped; hands the orchestrator back
    pub async fn run(mut self) -> SyncOrchestrator {
        let mut ticker = self.poll_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        info!("SyncDriver started (poll interval: {:?})", self.poll_interval);

        let mut jobs = FuturesUnordered::new();
        let mut in_flight: BTreeSet<Granularity> = BTreeSet::new();

        loop {
            let cmd = match self.pending.pop_front() {
                Some(cmd) => cmd,
                None => {
                    tokio::select! {
                        biased;
                        cmd = self.cmd_rx.recv() => match cmd {
                            Some(cmd) => cmd,
                            None => break,
                        },
                        Some(result) = jobs.next(), if !jobs.is_empty() => {
                            self.finish(result, &mut in_flight);
                            continue;
                        }
                        _ = next_tick(&mut ticker) => {
                            if self.orchestrator.phase() != SyncPhase::Tracking {
                                continue;
                            }
                            SyncCommand::Tick
                        }
                    }
                }
            };

            match cmd {
                SyncCommand::Shutdown => break,
                SyncCommand::SelectSymbol(symbol) if self.orchestrator.is_tracking(&symbol) => {
                    debug!("SyncDriver: {} already tracked, ticking", symbol);
                    self.pending.push_front(SyncCommand::Tick);
                }
                SyncCommand::SelectSymbol(symbol) => {
                    jobs.clear();
                    in_flight.clear();
                    let op = self.orchestrator.select_symbol(&symbol);
                    let outcome = preemptible(&mut self.cmd_rx, &mut self.pending, op).await;
                    log_outcome("select", outcome);
                }
                SyncCommand::Tick => match self.orchestrator.tick_jobs() {
                    Ok(ready) => {
                        for job in ready {
                            let granularity = job.granularity();
                            if in_flight.insert(granularity) {
                                jobs.push(job.run());
                            } else {
                                debug!("SyncDriver: [{}] previous update still in flight", granularity);
                            }
                        }
                    }
                    Err(e) => warn!("SyncDriver: tick rejected: {}", e),
                },
                SyncCommand::SwitchGranularity(granularity) => {
                    self.orchestrator.switch_displayed_granularity(granularity);
                }
                SyncCommand::Reset => {
                    jobs.clear();
                    in_flight.clear();
                    self.orchestrator.reset();
                }
                SyncCommand::Status(reply) => {
                    let _ = reply.send(SyncStatus::capture(&self.orchestrator));
                }
            }
        }

        info!("SyncDriver stopped");
        self.orchestrator
    }

    fn finish(&mut self, result: GranularityResult, in_flight: &mut BTreeSet<Granularity>) {
        in_flight.remove(&result.granularity());
        match self.orchestrator.commit(result) {
            Some(outcome) => {
                log_granularity(&outcome);
                self.orchestrator.notify_if_changed();
            }
            None => debug!("SyncDriver: superseded update discarded"),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Drives `op` to completion unless a superseding command arrives first.
///
/// Non-superseding commands received meanwhile are queued behind it. Returns
/// `None` when `op` was cancelled.
async fn preemptible<F: Future>(
    cmd_rx: &mut mpsc::Receiver<SyncCommand>,
    pending: &mut VecDeque<SyncCommand>,
    op: F,
) -> Option<F::Output> {
    tokio::pin!(op);
    loop {
        tokio::select! {
            biased;
            out = &mut op => return Some(out),
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) if cmd.supersedes_in_flight() => {
                    pending.push_front(cmd);
                    return None;
                }
                Some(cmd) => pending.push_back(cmd),
                None => {
                    pending.push_front(SyncCommand::Shutdown);
                    return None;
                }
            }
        }
    }
}

fn log_granularity(outcome: &GranularityOutcome) {
    let granularity = outcome.granularity;
    match (&outcome.update, &outcome.signal_error) {
        (Err(e), _) | (Ok(_), Some(e)) => warn!("SyncDriver: tick [{}] degraded: {}", granularity, e),
        (Ok(update), None) => debug!("SyncDriver: tick [{}] done: {:?}", granularity, update),
    }
}

fn log_outcome(what: &str, outcome: Option<Result<SyncReport, SyncError>>) {
    match outcome {
        None => info!("SyncDriver: in-flight {} superseded, results discarded", what),
        Some(Ok(report)) => {
            for (granularity, err) in report.errors() {
                warn!("SyncDriver: {} [{}] degraded: {}", what, granularity, err);
            }
            debug!("SyncDriver: {} done (notified={})", what, report.notified);
        }
        Some(Err(e)) => warn!("SyncDriver: {} rejected: {}", what, e),
    }
}

/// Cloneable control surface exposed to the host UI
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    async fn send(&self, cmd: SyncCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("sync driver is not running"))
    }

    pub async fn select_symbol(&self, symbol: impl Into<String>) -> Result<()> {
        self.send(SyncCommand::SelectSymbol(symbol.into())).await
    }

    pub async fn switch_granularity(&self, granularity: Granularity) -> Result<()> {
        self.send(SyncCommand::SwitchGranularity(granularity)).await
    }

    pub async fn tick(&self) -> Result<()> {
        self.send(SyncCommand::Tick).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(SyncCommand::Reset).await
    }

    /// Resolves once every previously sent command has been taken up.
    /// Incremental updates started by earlier ticks may still be in flight.
    pub async fn status(&self) -> Result<SyncStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::Status(tx)).await?;
        rx.await.context("sync driver dropped the status request")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SyncCommand::Shutdown).await
    }
}
