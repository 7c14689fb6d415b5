use crate::domain::sync::SyncPhase;
use thiserror::Error;

/// Errors raised at the wire-codec boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("Candle tuple needs at least 7 fields, got {found}")]
    TooFewFields { found: usize },

    #[error("Invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Non-finite {field} value cannot be transported")]
    NonFinite { field: &'static str },

    #[error("Unsupported candle payload shape: {shape}")]
    UnsupportedShape { shape: String },
}

/// Errors raised while synchronising a candle window
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Fetch failed: {reason}")]
    FetchFailure { reason: String },

    #[error("Fetched {what} is empty")]
    EmptyFetch { what: &'static str },

    #[error("Inconsistent boundary: expected live bucket {expected}, fetched {actual}")]
    InconsistentBoundary { expected: i64, actual: i64 },

    #[error("Candles out of order: {next} does not follow {previous}")]
    OutOfOrder { previous: i64, next: i64 },

    #[error("Window has not been initialized")]
    Uninitialized,

    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("Tick requires the Tracking phase, current phase is {phase:?}")]
    NotTracking { phase: SyncPhase },
}

impl SyncError {
    /// Wraps a collaborator failure, keeping the whole context chain
    pub fn fetch(err: anyhow::Error) -> Self {
        SyncError::FetchFailure {
            reason: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_formatting() {
        let err = FormatError::InvalidNumber {
            field: "close",
            value: "abc".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("close"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_boundary_error_formatting() {
        let err = SyncError::InconsistentBoundary {
            expected: 400,
            actual: 600,
        };
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("600"));
    }

    #[test]
    fn test_fetch_keeps_context() {
        let err = anyhow::anyhow!("connection reset").context("Failed to fetch candles");
        let msg = SyncError::fetch(err).to_string();
        assert!(msg.contains("Failed to fetch candles"));
        assert!(msg.contains("connection reset"));
    }
}
