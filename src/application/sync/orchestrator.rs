//! Synchronization Orchestrator
//!
//! Owns one [`SyncState`] per tracked granularity and the identity of the
//! selected symbol and displayed granularity. Work is split into one
//! [`GranularityJob`] per granularity. A job owns everything it needs: it
//! fetches history + live candle, bulk-loads or reconciles a copy of the
//! window, and recomputes signals when the window was loaded or crossed a
//! boundary. Jobs run concurrently and each is committed as soon as it
//! finishes, so a stalled fetch only delays its own granularity.
//!
//! Commits are synchronous. A job whose symbol selection was superseded, or
//! whose window changed since it was prepared, is discarded instead of applied.
//! Collaborator failures are soft: they are logged and reported, the affected
//! granularity keeps its previous state and the other one still updates.

use crate::application::market_data::boundary_reconciler::{
    BoundaryReconciler, FetchedTick, Reconciliation,
};
use crate::application::market_data::signal_cache::{SignalCache, SignalRecomputer};
use crate::domain::errors::SyncError;
use crate::domain::market::codec;
use crate::domain::market::granularity::Granularity;
use crate::domain::market::signal::{SignalGauge, SignalKind, SignalNames, SignalSeries};
use crate::domain::market::snapshot::ChartSnapshot;
use crate::domain::market::window::CandleWindow;
use crate::domain::ports::{MarketDataClient, PredictionClient, RenderGate};
use crate::domain::sync::SyncPhase;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SyncDependencies {
    pub market: Arc<dyn MarketDataClient>,
    pub prediction: Arc<dyn PredictionClient>,
    pub render: Arc<dyn RenderGate>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Window length including the live bar
    pub capacity: usize,
    /// Closed candles fetched per tick for boundary detection
    pub tail_count: usize,
    pub displayed: Granularity,
    pub signal_names: SignalNames,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            tail_count: 2,
            displayed: Granularity::FifteenMin,
            signal_names: SignalNames::default(),
        }
    }
}

/// Window and signals of one granularity
#[derive(Debug, Clone)]
pub struct SyncState {
    granularity: Granularity,
    window: CandleWindow,
    signals: SignalCache,
    /// Bumped on every commit
    revision: u64,
}

impl SyncState {
    fn new(granularity: Granularity, capacity: usize) -> Self {
        Self {
            granularity,
            window: CandleWindow::for_granularity(capacity, granularity),
            signals: SignalCache::new(),
            revision: 0,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }

    pub fn signals(&self) -> &SignalCache {
        &self.signals
    }

    pub fn is_loaded(&self) -> bool {
        !self.window.is_empty()
    }

    fn snapshot(&self, symbol: &str, forced: bool) -> ChartSnapshot {
        ChartSnapshot {
            symbol: symbol.to_string(),
            granularity: self.granularity,
            history: self.window.history(),
            live: self.window.live().copied(),
            signals: self.signals.series().clone(),
            forced,
        }
    }
}

/// What happened to a window during one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowUpdate {
    /// Bulk-loaded from scratch
    Loaded { len: usize },
    LiveUpdated,
    Advanced { settled_ts: i64, live_ts: i64 },
}

impl WindowUpdate {
    fn needs_signals(&self) -> bool {
        !matches!(self, WindowUpdate::LiveUpdated)
    }
}

#[derive(Debug)]
pub struct GranularityOutcome {
    pub granularity: Granularity,
    /// `Err` means the window was left untouched for this pass
    pub update: Result<WindowUpdate, SyncError>,
    /// Set when signal recomputation was attempted and failed
    pub signal_error: Option<SyncError>,
}

impl GranularityOutcome {
    pub fn recomputed(&self) -> bool {
        matches!(&self.update, Ok(update) if update.needs_signals()) && self.signal_error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<GranularityOutcome>,
    pub notified: bool,
}

impl SyncReport {
    pub fn outcome(&self, granularity: Granularity) -> Option<&GranularityOutcome> {
        self.outcomes.iter().find(|o| o.granularity == granularity)
    }

    pub fn errors(&self) -> impl Iterator<Item = (Granularity, &SyncError)> {
        self.outcomes.iter().flat_map(|o| {
            o.update
                .as_ref()
                .err()
                .into_iter()
                .chain(o.signal_error.iter())
                .map(move |e| (o.granularity, e))
        })
    }

    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }
}

/// Owned unit of work for one granularity.
///
/// Holds no borrow of the orchestrator, so jobs of different granularities
/// progress independently and any of them can be dropped at an await point
/// without leaving partial state behind.
pub struct GranularityJob {
    granularity: Granularity,
    generation: u64,
    revision: u64,
    symbol: String,
    count: usize,
    window: CandleWindow,
    market: Arc<dyn MarketDataClient>,
    recomputer: SignalRecomputer,
}

impl GranularityJob {
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub async fn run(self) -> GranularityResult {
        let granularity = self.granularity;
        let payloads =
            fetch_pair(self.market.as_ref(), &self.symbol, granularity, self.count).await;

        let mut candidate = self.window;
        let update = payloads
            .and_then(|(history, live)| apply_payloads(granularity, &mut candidate, &history, &live));
        let update = match update {
            Ok(update) => update,
            Err(e) => {
                warn!("SyncOrchestrator[{}]: update skipped: {}", granularity, e);
                return GranularityResult {
                    generation: self.generation,
                    revision: self.revision,
                    outcome: GranularityOutcome {
                        granularity,
                        update: Err(e),
                        signal_error: None,
                    },
                    window: None,
                    signals: None,
                };
            }
        };

        let (signals, signal_error) = if update.needs_signals() {
            match self.recomputer.compute(granularity, &candidate).await {
                Ok(series) => (Some(series), None),
                Err(e) => {
                    warn!(
                        "SyncOrchestrator[{}]: recomputation failed, keeping previous series: {}",
                        granularity, e
                    );
                    (None, Some(e))
                }
            }
        } else {
            (None, None)
        };

        GranularityResult {
            generation: self.generation,
            revision: self.revision,
            outcome: GranularityOutcome {
                granularity,
                update: Ok(update),
                signal_error,
            },
            window: Some(candidate),
            signals,
        }
    }
}

/// A finished job, waiting to be committed
pub struct GranularityResult {
    generation: u64,
    revision: u64,
    outcome: GranularityOutcome,
    window: Option<CandleWindow>,
    signals: Option<SignalSeries>,
}

impl GranularityResult {
    pub fn granularity(&self) -> Granularity {
        self.outcome.granularity
    }
}

pub struct SyncOrchestrator {
    market: Arc<dyn MarketDataClient>,
    render: Arc<dyn RenderGate>,
    recomputer: SignalRecomputer,
    capacity: usize,
    tail_count: usize,
    phase: SyncPhase,
    symbol: Option<String>,
    displayed: Granularity,
    states: BTreeMap<Granularity, SyncState>,
    /// Bumped whenever the tracked symbol is torn down
    generation: u64,
}

impl SyncOrchestrator {
    pub fn new(deps: SyncDependencies, settings: SyncSettings) -> Self {
        let capacity = settings.capacity.max(2);
        Self {
            market: deps.market,
            render: deps.render,
            recomputer: SignalRecomputer::new(deps.prediction, settings.signal_names),
            capacity,
            tail_count: settings.tail_count.max(1),
            phase: SyncPhase::Idle,
            symbol: None,
            displayed: settings.displayed,
            states: fresh_states(capacity),
            generation: 0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn displayed(&self) -> Granularity {
        self.displayed
    }

    pub fn state(&self, granularity: Granularity) -> Option<&SyncState> {
        self.states.get(&granularity)
    }

    /// Whether `symbol` (in any case, surrounding blanks ignored) is the one being tracked
    pub fn is_tracking(&self, symbol: &str) -> bool {
        self.phase == SyncPhase::Tracking
            && self.symbol.as_deref() == Some(normalize_symbol(symbol).as_str())
    }

    /// Current view of a granularity, or `None` without a selected symbol
    pub fn snapshot(&self, granularity: Granularity) -> Option<ChartSnapshot> {
        let symbol = self.symbol.as_deref()?;
        self.states
            .get(&granularity)
            .map(|state| state.snapshot(symbol, false))
    }

    /// Previous/current value of both named signals for every granularity
    pub fn signal_summary(&self) -> Vec<SignalGauge> {
        self.states
            .values()
            .flat_map(|state| {
                [SignalKind::Primary, SignalKind::Secondary].map(|kind| SignalGauge {
                    granularity: state.granularity,
                    kind,
                    reading: state.signals.series().reading(kind),
                })
            })
            .collect()
    }

    /// Selects the tracked symbol.
    ///
    /// Re-selecting the tracked symbol runs an incremental tick. A new symbol
    /// tears down all state, bulk-loads every granularity, recomputes signals and
    /// forces a redraw of the displayed granularity.
    pub async fn select_symbol(&mut self, symbol: &str) -> Result<SyncReport, SyncError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(SyncError::EmptySymbol);
        }

        if self.is_tracking(&symbol) {
            debug!("SyncOrchestrator: {} already tracked, running incremental update", symbol);
            return self.tick().await;
        }

        info!("SyncOrchestrator: loading {}", symbol);
        self.teardown();
        self.symbol = Some(symbol);
        self.phase = SyncPhase::Loading;

        let report = self.run_jobs(true).await?;
        self.phase = SyncPhase::Tracking;

        for (granularity, err) in report.errors() {
            warn!("SyncOrchestrator: initial load of {} incomplete: {}", granularity, err);
        }
        Ok(report)
    }

    /// One incremental update; only valid while tracking.
    ///
    /// Every granularity is committed as soon as its own job finishes, so if
    /// this future is dropped while one granularity is still pending the
    /// others are already up to date.
    pub async fn tick(&mut self) -> Result<SyncReport, SyncError> {
        self.run_jobs(false).await
    }

    /// Jobs for an incremental update of every granularity
    pub fn tick_jobs(&self) -> Result<Vec<GranularityJob>, SyncError> {
        if self.phase != SyncPhase::Tracking {
            return Err(SyncError::NotTracking { phase: self.phase });
        }
        self.jobs()
    }

    /// Applies a finished job and returns its outcome.
    ///
    /// Returns `None` when the job belongs to a symbol selection that has since
    /// been torn down, or when its window was committed by another job after
    /// this one was prepared.
    pub fn commit(&mut self, result: GranularityResult) -> Option<GranularityOutcome> {
        let granularity = result.granularity();
        if result.generation != self.generation {
            debug!("SyncOrchestrator[{}]: result of a previous selection discarded", granularity);
            return None;
        }
        let state = self.states.get_mut(&granularity)?;
        if result.revision != state.revision {
            debug!("SyncOrchestrator[{}]: stale result discarded", granularity);
            return None;
        }

        if let Some(window) = result.window {
            state.window = window;
        }
        if let Some(series) = result.signals {
            state.signals.replace(series);
        }
        state.revision += 1;
        Some(result.outcome)
    }

    /// Redraws the displayed granularity if its primary signal changed since the last redraw
    pub fn notify_if_changed(&mut self) -> bool {
        self.notify(false)
    }

    /// Changes the displayed granularity without fetching and forces a redraw from cached data
    pub fn switch_displayed_granularity(&mut self, granularity: Granularity) -> bool {
        if self.displayed != granularity {
            info!(
                "SyncOrchestrator: displayed granularity {} -> {}",
                self.displayed, granularity
            );
        }
        self.displayed = granularity;
        self.notify(true)
    }

    /// Drops the symbol and all per-granularity state
    pub fn reset(&mut self) {
        if let Some(symbol) = self.symbol.take() {
            info!("SyncOrchestrator: stopped tracking {}", symbol);
        }
        self.teardown();
        self.phase = SyncPhase::Idle;
    }

    fn teardown(&mut self) {
        self.states = fresh_states(self.capacity);
        self.generation += 1;
    }

    fn jobs(&self) -> Result<Vec<GranularityJob>, SyncError> {
        let symbol = self.symbol.as_deref().ok_or(SyncError::EmptySymbol)?;
        Ok(self
            .states
            .values()
            .map(|state| GranularityJob {
                granularity: state.granularity,
                generation: self.generation,
                revision: state.revision,
                symbol: symbol.to_string(),
                count: if state.is_loaded() {
                    self.tail_count
                } else {
                    self.capacity - 1
                },
                window: state.window.clone(),
                market: self.market.clone(),
                recomputer: self.recomputer.clone(),
            })
            .collect())
    }

    async fn run_jobs(&mut self, loading: bool) -> Result<SyncReport, SyncError> {
        let jobs = if loading { self.jobs()? } else { self.tick_jobs()? };
        let mut in_flight: FuturesUnordered<_> =
            jobs.into_iter().map(GranularityJob::run).collect();

        let mut report = SyncReport::default();
        while let Some(result) = in_flight.next().await {
            if let Some(outcome) = self.commit(result) {
                report.outcomes.push(outcome);
            }
            if !loading {
                report.notified |= self.notify(false);
            }
        }

        if loading {
            report.notified = self.notify(true);
        }
        Ok(report)
    }

    fn notify(&mut self, forced: bool) -> bool {
        let Some(symbol) = self.symbol.as_deref() else {
            return false;
        };
        let Some(state) = self.states.get_mut(&self.displayed) else {
            return false;
        };
        if !forced && !state.signals.primary_changed() {
            return false;
        }

        state.signals.mark_seen();
        let snapshot = state.snapshot(symbol, forced);
        info!(
            "SyncOrchestrator[{}]: render notification (forced={}, primary={:?})",
            state.granularity,
            forced,
            state.signals.latest_primary()
        );
        self.render.on_change(&snapshot);
        true
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

fn fresh_states(capacity: usize) -> BTreeMap<Granularity, SyncState> {
    Granularity::all()
        .into_iter()
        .map(|g| (g, SyncState::new(g, capacity)))
        .collect()
}

/// Bulk-loads an empty window, reconciles a loaded one
fn apply_payloads(
    granularity: Granularity,
    window: &mut CandleWindow,
    history: &Value,
    live: &Value,
) -> Result<WindowUpdate, SyncError> {
    if window.is_empty() {
        let history = codec::decode_many(history)?;
        let live = codec::decode_one(live)?;
        window.initialize(history, live)?;
        info!("SyncOrchestrator[{}]: loaded {} candles", granularity, window.len());
        return Ok(WindowUpdate::Loaded { len: window.len() });
    }

    let fetched = FetchedTick::decode(history, live)?;
    Ok(match BoundaryReconciler::new(granularity).reconcile(window, fetched)? {
        Reconciliation::LiveUpdated => WindowUpdate::LiveUpdated,
        Reconciliation::Advanced { settled, live } => WindowUpdate::Advanced {
            settled_ts: settled.timestamp,
            live_ts: live.timestamp,
        },
    })
}

async fn fetch_pair(
    market: &dyn MarketDataClient,
    symbol: &str,
    granularity: Granularity,
    count: usize,
) -> Result<(Value, Value), SyncError> {
    let (history, live) = tokio::join!(
        market.fetch_history(symbol, granularity, count),
        market.fetch_live_candle(symbol, granularity)
    );
    Ok((
        history.map_err(SyncError::fetch)?,
        live.map_err(SyncError::fetch)?,
    ))
}
