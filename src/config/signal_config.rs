//! Signal naming configuration parsing from environment variables.

use crate::domain::market::signal::SignalNames;
use std::env;

/// Signal naming environment configuration
#[derive(Debug, Clone)]
pub struct SignalEnvConfig {
    pub model_prefix: String,
    pub primary_name: String,
    pub secondary_name: String,
}

impl Default for SignalEnvConfig {
    fn default() -> Self {
        let names = SignalNames::default();
        Self {
            model_prefix: names.model_prefix,
            primary_name: names.primary,
            secondary_name: names.secondary,
        }
    }
}

impl SignalEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_prefix: Self::non_empty("SIGNAL_MODEL_PREFIX", defaults.model_prefix),
            primary_name: Self::non_empty("SIGNAL_PRIMARY_NAME", defaults.primary_name),
            secondary_name: Self::non_empty("SIGNAL_SECONDARY_NAME", defaults.secondary_name),
        }
    }

    pub fn names(&self) -> SignalNames {
        SignalNames {
            model_prefix: self.model_prefix.clone(),
            primary: self.primary_name.clone(),
            secondary: self.secondary_name.clone(),
        }
    }

    fn non_empty(key: &str, default: String) -> String {
        env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }
}
