//! Trendterm - headless chart/signal terminal
//!
//! Tracks one symbol on the 15m and 1h granularities, keeps the candle windows
//! in sync with the terminal API and logs a chart line whenever the displayed
//! trend signal changes.
//!
//! # Usage
//! ```sh
//! cargo run -- BTCUSDT --granularity 1h
//! cargo run -- BTCUSDT --mock
//! ```
//!
//! # Environment Variables
//! See `config` for the full list (`TERMINAL_API_BASE_URL`, `SYNC_POLL_INTERVAL_MS`, ...).

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;
use trendterm::application::sync::{SyncDependencies, SyncDriver, SyncHandle, SyncOrchestrator};
use trendterm::config::Config;
use trendterm::domain::market::candle::Candle;
use trendterm::domain::market::granularity::Granularity;
use trendterm::domain::ports::{MarketDataClient, PredictionClient};
use trendterm::infrastructure::{LoggingRenderGate, MockTerminalClient, TerminalApiClient};

#[derive(Parser)]
#[command(author, version, about = "Headless candle and trend-signal terminal", long_about = None)]
struct Cli {
    /// Symbol to track
    symbol: String,

    /// Displayed granularity (15m or 1h); overrides SYNC_DISPLAYED_GRANULARITY
    #[arg(short, long)]
    granularity: Option<String>,

    /// Overrides TERMINAL_API_BASE_URL
    #[arg(long)]
    base_url: Option<String>,

    /// Run against generated in-memory data instead of the terminal API
    #[arg(long)]
    mock: bool,

    /// Seconds between signal summary log lines (0 disables)
    #[arg(long, default_value = "60")]
    summary_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    info!("Trendterm {} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env()?;
    if let Some(granularity) = &cli.granularity {
        config.sync.displayed_granularity =
            Granularity::from_str(granularity).context("Invalid --granularity")?;
    }
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    info!(
        "Configuration loaded: capacity={}, tail={}, poll={}ms, displayed={}",
        config.sync.window_capacity,
        config.sync.tail_count,
        config.sync.poll_interval_ms,
        config.sync.displayed_granularity
    );

    let (market, prediction): (Arc<dyn MarketDataClient>, Arc<dyn PredictionClient>) = if cli.mock
    {
        info!("Mode: MOCK (generated candles, synthetic signals)");
        let mock = Arc::new(MockTerminalClient::with_names(config.signal.names()));
        let now = Utc::now().timestamp_millis();
        for granularity in Granularity::all() {
            let interval = granularity.interval_ms();
            let count = config.sync.window_capacity;
            let start = now - now.rem_euclid(interval) - (count as i64 - 1) * interval;
            mock.generate_series(&cli.symbol.to_uppercase(), granularity, start, count, 100.0);
        }
        tokio::spawn(simulate_feed(
            mock.clone(),
            cli.symbol.to_uppercase(),
            config.sync.poll_interval(),
        ));
        let market: Arc<dyn MarketDataClient> = mock.clone();
        let prediction: Arc<dyn PredictionClient> = mock;
        (market, prediction)
    } else {
        info!("Mode: LIVE (terminal API at {})", config.api.base_url);
        let client = Arc::new(TerminalApiClient::from_config(&config.api));
        let market: Arc<dyn MarketDataClient> = client.clone();
        let prediction: Arc<dyn PredictionClient> = client;
        (market, prediction)
    };

    let orchestrator = SyncOrchestrator::new(
        SyncDependencies {
            market,
            prediction,
            render: Arc::new(LoggingRenderGate::new()),
        },
        config.sync_settings(),
    );
    let (handle, driver_task) =
        SyncDriver::spawn(orchestrator, Some(config.sync.poll_interval()));

    handle.select_symbol(cli.symbol.as_str()).await?;

    if cli.summary_interval > 0 {
        let handle = handle.clone();
        tokio::spawn(report_summary(handle, Duration::from_secs(cli.summary_interval)));
    }

    info!("Terminal running. Press Ctrl+C to shutdown.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");

    handle.shutdown().await?;
    driver_task.await.context("Sync driver task failed")?;
    Ok(())
}

/// Keeps the mock feed moving with the wall clock: nudges the forming bar and
/// opens a new one whenever its bucket has elapsed
async fn simulate_feed(mock: Arc<MockTerminalClient>, symbol: String, every: Duration) {
    let mut interval = tokio::time::interval(every);
    let mut step: u64 = 0;
    loop {
        interval.tick().await;
        step += 1;
        let now = Utc::now().timestamp_millis();
        for granularity in Granularity::all() {
            let Some(live) = mock.live(&symbol, granularity) else {
                continue;
            };
            let drift = if step % 2 == 0 { 0.1 } else { -0.05 };
            let bucket = now - now.rem_euclid(granularity.interval_ms());
            if bucket > live.timestamp {
                let next = Candle {
                    timestamp: live.timestamp + granularity.interval_ms(),
                    open: live.close,
                    high: live.close,
                    low: live.close,
                    close: live.close,
                    volume: 0.0,
                    turnover: 0.0,
                };
                mock.close_bucket(&symbol, granularity, live, next);
            } else {
                let close = live.close + drift;
                mock.update_live(
                    &symbol,
                    granularity,
                    Candle {
                        high: live.high.max(close),
                        low: live.low.min(close),
                        close,
                        volume: live.volume + 1.0,
                        turnover: live.turnover + close,
                        ..live
                    },
                );
            }
        }
    }
}

async fn report_summary(handle: SyncHandle, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        let status = match handle.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Summary: {}", e);
                return;
            }
        };
        info!(
            "Summary: {} {} ({})",
            status.symbol.as_deref().unwrap_or("-"),
            status.phase,
            status
                .window_lens
                .iter()
                .map(|(g, len)| format!("{}={}", g, len))
                .collect::<Vec<_>>()
                .join(", ")
        );
        for gauge in status.gauges {
            let reading = gauge.reading;
            info!(
                "Summary: {} {:?} previous={} current={} bias={}",
                gauge.granularity,
                gauge.kind,
                reading.previous.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v)),
                reading.current.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v)),
                reading.bias().map_or_else(|| "-".to_string(), |b| b.to_string())
            );
        }
    }
}
