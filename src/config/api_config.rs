//! Terminal web API configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Terminal API environment configuration
#[derive(Debug, Clone)]
pub struct ApiEnvConfig {
    /// API root, may carry a path prefix (`http://host/terminal`)
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ApiEnvConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

impl ApiEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let base_url = env::var("TERMINAL_API_BASE_URL").unwrap_or(defaults.base_url);
        url::Url::parse(&base_url)
            .with_context(|| format!("TERMINAL_API_BASE_URL is not a valid URL: {}", base_url))?;

        let timeout_secs = env::var("TERMINAL_API_TIMEOUT_SECS")
            .unwrap_or_else(|_| defaults.timeout_secs.to_string())
            .parse::<u64>()
            .context("Failed to parse TERMINAL_API_TIMEOUT_SECS")?;
        if timeout_secs == 0 {
            anyhow::bail!("TERMINAL_API_TIMEOUT_SECS must be greater than 0");
        }

        let max_retries = env::var("TERMINAL_API_MAX_RETRIES")
            .unwrap_or_else(|_| defaults.max_retries.to_string())
            .parse::<u32>()
            .context("Failed to parse TERMINAL_API_MAX_RETRIES")?;

        Ok(Self {
            base_url,
            timeout_secs,
            max_retries,
        })
    }
}
