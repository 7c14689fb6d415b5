//! Configuration module for Trendterm.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: terminal API, sync engine, and signal naming.

mod api_config;
mod signal_config;
mod sync_config;

pub use api_config::ApiEnvConfig;
pub use signal_config::SignalEnvConfig;
pub use sync_config::SyncEnvConfig;

use crate::application::sync::SyncSettings;
use anyhow::{Context, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiEnvConfig,
    pub sync: SyncEnvConfig,
    pub signal: SignalEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; malformed or out-of-range values are rejected.
    pub fn from_env() -> Result<Self> {
        let api = ApiEnvConfig::from_env().context("Failed to load terminal API config")?;
        let sync = SyncEnvConfig::from_env().context("Failed to load sync config")?;
        let signal = SignalEnvConfig::from_env();

        Ok(Self { api, sync, signal })
    }

    /// Engine settings derived from the sync and signal sections
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            capacity: self.sync.window_capacity,
            tail_count: self.sync.tail_count,
            displayed: self.sync.displayed_granularity,
            signal_names: self.signal.names(),
        }
    }
}
