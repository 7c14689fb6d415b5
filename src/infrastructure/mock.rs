//! In-memory collaborators for running the engine without a terminal server.
//!
//! `MockTerminalClient` mimics the terminal API: per (symbol, granularity) it
//! holds a scripted candle series whose last element is the forming bar. The
//! history endpoint never includes that bar. Predictions are generated
//! deterministically from the posted candles unless a fixed response is set.

use crate::domain::market::candle::Candle;
use crate::domain::market::codec::{self, WireCandle};
use crate::domain::market::granularity::Granularity;
use crate::domain::market::signal::{SignalKind, SignalNames};
use crate::domain::market::snapshot::ChartSnapshot;
use crate::domain::ports::{MarketDataClient, PredictionClient, RenderGate};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Default)]
struct MockState {
    series: HashMap<(String, Granularity), Vec<Candle>>,
    failing_market: HashSet<Granularity>,
    prediction_failing: bool,
    fixed_prediction: Option<HashMap<String, Vec<f64>>>,
    history_requests: Vec<(String, Granularity, usize)>,
    live_calls: usize,
    prediction_requests: Vec<(usize, Vec<String>)>,
}

pub struct MockTerminalClient {
    state: Mutex<MockState>,
    names: SignalNames,
    held: watch::Sender<Option<String>>,
    stalled_market: watch::Sender<HashSet<Granularity>>,
    stalled_prediction: watch::Sender<HashSet<Granularity>>,
}

impl Default for MockTerminalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTerminalClient {
    pub fn new() -> Self {
        Self::with_names(SignalNames::default())
    }

    pub fn with_names(names: SignalNames) -> Self {
        let (held, _) = watch::channel(None);
        let (stalled_market, _) = watch::channel(HashSet::new());
        let (stalled_prediction, _) = watch::channel(HashSet::new());
        Self {
            state: Mutex::new(MockState::default()),
            names,
            held,
            stalled_market,
            stalled_prediction,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not cascade into unrelated assertions
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scripts the full series; the last candle is the forming one
    pub fn set_series(&self, symbol: &str, granularity: Granularity, candles: Vec<Candle>) {
        self.lock()
            .series
            .insert((symbol.to_string(), granularity), candles);
    }

    /// Scripts `count` generated candles ending at the forming bar
    pub fn generate_series(
        &self,
        symbol: &str,
        granularity: Granularity,
        start_ts: i64,
        count: usize,
        base_price: f64,
    ) {
        let candles = generated_candles(start_ts, granularity.interval_ms(), count, base_price);
        self.set_series(symbol, granularity, candles);
    }

    /// The scripted forming candle
    pub fn live(&self, symbol: &str, granularity: Granularity) -> Option<Candle> {
        self.lock()
            .series
            .get(&(symbol.to_string(), granularity))
            .and_then(|series| series.last().copied())
    }

    /// Replaces the forming candle in place (same bucket)
    pub fn update_live(&self, symbol: &str, granularity: Granularity, candle: Candle) {
        if let Some(last) = self
            .lock()
            .series
            .get_mut(&(symbol.to_string(), granularity))
            .and_then(|series| series.last_mut())
        {
            *last = candle;
        }
    }

    /// Closes the forming bar with its settled values and opens `next_live`
    pub fn close_bucket(
        &self,
        symbol: &str,
        granularity: Granularity,
        settled: Candle,
        next_live: Candle,
    ) {
        let mut state = self.lock();
        let series = state
            .series
            .entry((symbol.to_string(), granularity))
            .or_default();
        if let Some(last) = series.last_mut() {
            *last = settled;
        }
        series.push(next_live);
    }

    pub fn fail_market(&self, granularity: Granularity, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_market.insert(granularity);
        } else {
            state.failing_market.remove(&granularity);
        }
    }

    pub fn fail_prediction(&self, failing: bool) {
        self.lock().prediction_failing = failing;
    }

    /// Serves `response` for every prediction request instead of generating one
    pub fn set_prediction(&self, response: HashMap<String, Vec<f64>>) {
        self.lock().fixed_prediction = Some(response);
    }

    /// Blocks market fetches for `symbol` until [`release`](Self::release)
    pub fn hold(&self, symbol: &str) {
        self.held.send_replace(Some(symbol.to_string()));
    }

    pub fn release(&self) {
        self.held.send_replace(None);
    }

    /// Leaves market fetches of `granularity` pending until the stall is lifted
    pub fn stall(&self, granularity: Granularity, stalled: bool) {
        toggle(&self.stalled_market, granularity, stalled);
    }

    /// Leaves prediction requests carrying the marker of `granularity` pending
    pub fn stall_prediction(&self, granularity: Granularity, stalled: bool) {
        toggle(&self.stalled_prediction, granularity, stalled);
    }

    pub fn history_calls(&self) -> usize {
        self.lock().history_requests.len()
    }

    pub fn history_requests(&self) -> Vec<(String, Granularity, usize)> {
        self.lock().history_requests.clone()
    }

    pub fn live_calls(&self) -> usize {
        self.lock().live_calls
    }

    pub fn prediction_calls(&self) -> usize {
        self.lock().prediction_requests.len()
    }

    /// (candle count, markers) of every prediction request
    pub fn prediction_requests(&self) -> Vec<(usize, Vec<String>)> {
        self.lock().prediction_requests.clone()
    }

    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.history_requests.clear();
        state.live_calls = 0;
        state.prediction_requests.clear();
    }

    async fn wait_unless_held(&self, symbol: &str, granularity: Granularity) {
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| held.as_deref() != Some(symbol)).await;
        wait_unless_stalled(&self.stalled_market, granularity).await;
    }

    fn series_for(&self, symbol: &str, granularity: Granularity) -> Result<Vec<Candle>> {
        let state = self.lock();
        if state.failing_market.contains(&granularity) {
            bail!("mock market data unavailable for {}", granularity);
        }
        match state.series.get(&(symbol.to_string(), granularity)) {
            Some(series) if !series.is_empty() => Ok(series.clone()),
            _ => bail!("empty candle list"),
        }
    }

    fn generate_prediction(&self, candles: &[Candle], markers: &[String]) -> HashMap<String, Vec<f64>> {
        let closed = &candles[..candles.len().saturating_sub(1)];
        let primary: Vec<f64> = closed.iter().map(|c| synthetic_signal(c.close)).collect();
        let secondary: Vec<f64> = primary.iter().map(|v| 1.0 - v).collect();

        let mut response = HashMap::new();
        for granularity in Granularity::all() {
            for (kind, values) in [(SignalKind::Primary, &primary), (SignalKind::Secondary, &secondary)] {
                let key = self.names.key(granularity, kind);
                if markers.iter().any(|m| key.contains(m.as_str())) {
                    response.insert(key, values.clone());
                }
            }
        }
        response
    }
}

#[async_trait]
impl MarketDataClient for MockTerminalClient {
    async fn fetch_history(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Value> {
        self.lock()
            .history_requests
            .push((symbol.to_string(), granularity, count));
        self.wait_unless_held(symbol, granularity).await;

        let series = self.series_for(symbol, granularity)?;
        let closed = &series[..series.len() - 1];
        if closed.is_empty() {
            bail!("empty candle list");
        }
        let tail = &closed[closed.len().saturating_sub(count)..];
        Ok(serde_json::to_value(codec::encode_all(tail)?)?)
    }

    async fn fetch_live_candle(&self, symbol: &str, granularity: Granularity) -> Result<Value> {
        self.lock().live_calls += 1;
        self.wait_unless_held(symbol, granularity).await;

        let series = self.series_for(symbol, granularity)?;
        let live = series.last().ok_or_else(|| anyhow!("empty candle list"))?;
        Ok(serde_json::to_value(codec::encode(live)?)?)
    }
}

#[async_trait]
impl PredictionClient for MockTerminalClient {
    async fn fetch_signals(
        &self,
        candles: &[WireCandle],
        markers: &[String],
    ) -> Result<HashMap<String, Vec<f64>>> {
        let fixed = {
            let mut state = self.lock();
            state
                .prediction_requests
                .push((candles.len(), markers.to_vec()));
            if state.prediction_failing {
                bail!("mock prediction service unavailable");
            }
            state.fixed_prediction.clone()
        };
        for granularity in Granularity::all() {
            let marker = self.names.marker(granularity);
            if markers.iter().any(|m| *m == marker) {
                wait_unless_stalled(&self.stalled_prediction, granularity).await;
            }
        }
        if let Some(response) = fixed {
            return Ok(response);
        }

        let decoded = candles
            .iter()
            .map(|fields| codec::decode_wire(fields.as_slice()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.generate_prediction(&decoded, markers))
    }
}

fn toggle(stalls: &watch::Sender<HashSet<Granularity>>, granularity: Granularity, stalled: bool) {
    stalls.send_modify(|set| {
        if stalled {
            set.insert(granularity);
        } else {
            set.remove(&granularity);
        }
    });
}

async fn wait_unless_stalled(stalls: &watch::Sender<HashSet<Granularity>>, granularity: Granularity) {
    let mut rx = stalls.subscribe();
    let _ = rx.wait_for(|set| !set.contains(&granularity)).await;
}

/// Signal value in `[0, 1)` derived from a close price
pub fn synthetic_signal(close: f64) -> f64 {
    ((close * 37.0).rem_euclid(1000.0)).floor() / 1000.0
}

/// `count` consecutive candles starting at `start_ts`, gently trending upward
pub fn generated_candles(start_ts: i64, interval_ms: i64, count: usize, base_price: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let open = base_price + i as f64;
            let close = open + if i % 3 == 0 { -0.5 } else { 0.75 };
            Candle {
                timestamp: start_ts + i as i64 * interval_ms,
                open,
                high: open.max(close) + 0.25,
                low: open.min(close) - 0.25,
                close,
                volume: 100.0 + i as f64,
                turnover: (100.0 + i as f64) * close,
            }
        })
        .collect()
}

/// Render gate that records every snapshot it is handed
#[derive(Default)]
pub struct RecordingRenderGate {
    snapshots: Mutex<Vec<ChartSnapshot>>,
}

impl RecordingRenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChartSnapshot>> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn snapshots(&self) -> Vec<ChartSnapshot> {
        self.lock().clone()
    }

    pub fn last(&self) -> Option<ChartSnapshot> {
        self.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl RenderGate for RecordingRenderGate {
    fn on_change(&self, snapshot: &ChartSnapshot) {
        self.lock().push(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_excludes_live_bar() {
        let mock = MockTerminalClient::new();
        mock.generate_series("BTCUSDT", Granularity::FifteenMin, 0, 5, 100.0);

        let history = mock
            .fetch_history("BTCUSDT", Granularity::FifteenMin, 2)
            .await
            .unwrap();
        let candles = codec::decode_many(&history).unwrap();
        let ts: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![1_800_000, 2_700_000]);

        let live = mock
            .fetch_live_candle("BTCUSDT", Granularity::FifteenMin)
            .await
            .unwrap();
        assert_eq!(codec::decode_one(&live).unwrap().unwrap().timestamp, 3_600_000);
        assert_eq!(mock.history_calls(), 1);
        assert_eq!(mock.live_calls(), 1);
    }

    #[test]
    fn test_unknown_symbol_and_failures() {
        let mock = MockTerminalClient::new();
        tokio_test::block_on(async {
            assert!(mock.fetch_live_candle("NOPE", Granularity::OneHour).await.is_err());

            mock.generate_series("ETHUSDT", Granularity::OneHour, 0, 3, 10.0);
            mock.fail_market(Granularity::OneHour, true);
            assert!(mock.fetch_history("ETHUSDT", Granularity::OneHour, 2).await.is_err());
            mock.fail_market(Granularity::OneHour, false);
            tokio_test::assert_ok!(mock.fetch_history("ETHUSDT", Granularity::OneHour, 2).await);
        });
    }

    #[tokio::test]
    async fn test_generated_prediction_follows_markers() {
        let mock = MockTerminalClient::new();
        let candles = generated_candles(0, 900_000, 4, 50.0);
        let wire = codec::encode_all(&candles).unwrap();

        let response = mock
            .fetch_signals(&wire, &["xgb_linear-M15_".to_string()])
            .await
            .unwrap();
        assert_eq!(response.len(), 2);
        let primary = &response["xgb_linear-M15_PerfectTrend-p4"];
        assert_eq!(primary.len(), 3);
        assert_eq!(primary[2], synthetic_signal(candles[2].close));
        assert!(!response.contains_key("xgb_linear-H1_PerfectTrend-p4"));

        mock.fail_prediction(true);
        assert!(mock.fetch_signals(&wire, &[]).await.is_err());
        assert_eq!(mock.prediction_calls(), 2);
    }

    #[tokio::test]
    async fn test_stall_only_blocks_its_granularity() {
        let mock = MockTerminalClient::new();
        mock.generate_series("BTCUSDT", Granularity::FifteenMin, 0, 3, 10.0);
        mock.generate_series("BTCUSDT", Granularity::OneHour, 0, 3, 10.0);
        mock.stall(Granularity::OneHour, true);
        mock.stall_prediction(Granularity::OneHour, true);
        let wait = std::time::Duration::from_millis(50);

        let live = |granularity| mock.fetch_live_candle("BTCUSDT", granularity);
        assert!(tokio::time::timeout(wait, live(Granularity::OneHour)).await.is_err());

        let wire = codec::encode_all(&generated_candles(0, 3_600_000, 3, 10.0)).unwrap();
        let markers = ["xgb_linear-H1_".to_string()];
        assert!(tokio::time::timeout(wait, mock.fetch_signals(&wire, &markers)).await.is_err());

        let other = tokio::time::timeout(wait, live(Granularity::FifteenMin)).await;
        assert!(matches!(other, Ok(Ok(_))));

        mock.stall(Granularity::OneHour, false);
        let released = tokio::time::timeout(wait, live(Granularity::OneHour)).await;
        assert!(matches!(released, Ok(Ok(_))));
    }

    #[test]
    fn test_recording_render_gate() {
        let gate = RecordingRenderGate::new();
        assert_eq!(gate.count(), 0);
        gate.on_change(&ChartSnapshot {
            symbol: "BTCUSDT".to_string(),
            granularity: Granularity::OneHour,
            history: Vec::new(),
            live: None,
            signals: Default::default(),
            forced: true,
        });
        assert_eq!(gate.count(), 1);
        assert_eq!(gate.last().unwrap().symbol, "BTCUSDT");
        gate.clear();
        assert!(gate.last().is_none());
    }
}
