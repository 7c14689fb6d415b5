use crate::domain::market::codec::WireCandle;
use crate::domain::market::granularity::Granularity;
use crate::domain::market::snapshot::ChartSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Candle source. Payloads are returned in wire form and decoded by the engine.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Most recent `count` closed (or nearly closed) candles, oldest first
    async fn fetch_history(&self, symbol: &str, granularity: Granularity, count: usize) -> Result<Value>;

    /// The bucket currently forming
    async fn fetch_live_candle(&self, symbol: &str, granularity: Granularity) -> Result<Value>;
}

/// Remote trend-signal prediction. May omit requested series; idempotent for identical input.
#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn fetch_signals(
        &self,
        candles: &[WireCandle],
        markers: &[String],
    ) -> Result<HashMap<String, Vec<f64>>>;
}

/// Receives redraw notifications only when displayed data actually changed
pub trait RenderGate: Send + Sync {
    fn on_change(&self, snapshot: &ChartSnapshot);
}
