use super::granularity::Granularity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Signal values at or above this level read as bullish
pub const BULLISH_THRESHOLD: f64 = 0.5;

/// The two derived trend indicators tracked per granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Trend indicator, drives redraw change detection
    Primary,
    /// Next-step indicator
    Secondary,
}

/// Naming scheme of remote prediction series.
///
/// Series come back keyed `{prefix}-{code}_{name}`, e.g. `xgb_linear-H1_PerfectTrend-p4`,
/// and are requested with the marker `{prefix}-{code}_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalNames {
    pub model_prefix: String,
    pub primary: String,
    pub secondary: String,
}

impl Default for SignalNames {
    fn default() -> Self {
        Self {
            model_prefix: "xgb_linear".to_string(),
            primary: "PerfectTrend-p4".to_string(),
            secondary: "NextPerfectTrend-p9".to_string(),
        }
    }
}

impl SignalNames {
    pub fn marker(&self, granularity: Granularity) -> String {
        format!("{}-{}_", self.model_prefix, granularity.display_code())
    }

    pub fn key(&self, granularity: Granularity, kind: SignalKind) -> String {
        let name = match kind {
            SignalKind::Primary => &self.primary,
            SignalKind::Secondary => &self.secondary,
        };
        format!("{}{}", self.marker(granularity), name)
    }
}

/// Latest computed signal series of one granularity, replaced wholesale on recomputation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    primary: Vec<f64>,
    secondary: Vec<f64>,
}

impl SignalSeries {
    pub fn new(primary: Vec<f64>, secondary: Vec<f64>) -> Self {
        Self { primary, secondary }
    }

    /// Picks the tracked series out of a remote response; absent keys become empty series
    pub fn from_response(
        response: &HashMap<String, Vec<f64>>,
        names: &SignalNames,
        granularity: Granularity,
    ) -> Self {
        let pick = |kind| {
            response
                .get(&names.key(granularity, kind))
                .cloned()
                .unwrap_or_default()
        };
        Self {
            primary: pick(SignalKind::Primary),
            secondary: pick(SignalKind::Secondary),
        }
    }

    pub fn series(&self, kind: SignalKind) -> &[f64] {
        match kind {
            SignalKind::Primary => &self.primary,
            SignalKind::Secondary => &self.secondary,
        }
    }

    pub fn latest(&self, kind: SignalKind) -> Option<f64> {
        self.series(kind).last().copied()
    }

    pub fn previous(&self, kind: SignalKind) -> Option<f64> {
        let series = self.series(kind);
        series.len().checked_sub(2).map(|idx| series[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Left-pads the series with zeros to `history_len` and repeats the last
    /// value once more for the live slot, so it lines up with a full window.
    pub fn padded(&self, kind: SignalKind, history_len: usize) -> Vec<f64> {
        let series = self.series(kind);
        let mut out = vec![0.0; history_len.saturating_sub(series.len())];
        out.extend_from_slice(series);
        let last = out.last().copied().unwrap_or(0.0);
        out.push(last);
        out
    }

    pub fn reading(&self, kind: SignalKind) -> SignalReading {
        SignalReading {
            previous: self.previous(kind),
            current: self.latest(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalBias {
    Bullish,
    Bearish,
}

impl SignalBias {
    pub fn from_value(value: f64) -> Self {
        if value < BULLISH_THRESHOLD {
            SignalBias::Bearish
        } else {
            SignalBias::Bullish
        }
    }
}

impl fmt::Display for SignalBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalBias::Bullish => write!(f, "bullish"),
            SignalBias::Bearish => write!(f, "bearish"),
        }
    }
}

/// Previous and current value of one named signal
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalReading {
    pub previous: Option<f64>,
    pub current: Option<f64>,
}

impl SignalReading {
    pub fn bias(&self) -> Option<SignalBias> {
        self.current.map(SignalBias::from_value)
    }
}

/// One gauge of the signal panel: a named signal of one granularity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalGauge {
    pub granularity: Granularity,
    pub kind: SignalKind,
    pub reading: SignalReading,
}
