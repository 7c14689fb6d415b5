//! Sync engine configuration parsing from environment variables.
//!
//! Window sizing, tick cadence and the initially displayed granularity.

use crate::domain::market::granularity::Granularity;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Sync engine environment configuration
#[derive(Debug, Clone)]
pub struct SyncEnvConfig {
    /// Window length including the live bar
    pub window_capacity: usize,
    /// Closed candles fetched per tick
    pub tail_count: usize,
    pub poll_interval_ms: u64,
    pub displayed_granularity: Granularity,
}

impl Default for SyncEnvConfig {
    fn default() -> Self {
        Self {
            window_capacity: 100,
            tail_count: 2,
            poll_interval_ms: 4000,
            displayed_granularity: Granularity::FifteenMin,
        }
    }
}

impl SyncEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let window_capacity = Self::parse_usize("SYNC_WINDOW_CAPACITY", defaults.window_capacity)?;
        if window_capacity < 2 {
            anyhow::bail!(
                "SYNC_WINDOW_CAPACITY must be at least 2 (got {})",
                window_capacity
            );
        }

        let tail_count = Self::parse_usize("SYNC_TAIL_COUNT", defaults.tail_count)?;
        if tail_count < 1 {
            anyhow::bail!("SYNC_TAIL_COUNT must be at least 1");
        }

        let poll_interval_ms = env::var("SYNC_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| defaults.poll_interval_ms.to_string())
            .parse::<u64>()
            .context("Failed to parse SYNC_POLL_INTERVAL_MS")?;
        if poll_interval_ms == 0 {
            anyhow::bail!("SYNC_POLL_INTERVAL_MS must be greater than 0");
        }

        let displayed_granularity = match env::var("SYNC_DISPLAYED_GRANULARITY") {
            Ok(value) => Granularity::from_str(&value)
                .context("Failed to parse SYNC_DISPLAYED_GRANULARITY")?,
            Err(_) => defaults.displayed_granularity,
        };

        Ok(Self {
            window_capacity,
            tail_count,
            poll_interval_ms,
            displayed_granularity,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }
}
