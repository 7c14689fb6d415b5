use super::candle::Candle;
use super::granularity::Granularity;
use super::signal::{SignalKind, SignalSeries};

/// Read-only view handed to the renderer on a notified change
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSnapshot {
    pub symbol: String,
    pub granularity: Granularity,
    pub history: Vec<Candle>,
    pub live: Option<Candle>,
    pub signals: SignalSeries,
    /// Set when the redraw was forced rather than triggered by a signal change
    pub forced: bool,
}

impl ChartSnapshot {
    pub fn primary(&self) -> &[f64] {
        self.signals.series(SignalKind::Primary)
    }

    pub fn secondary(&self) -> &[f64] {
        self.signals.series(SignalKind::Secondary)
    }

    /// Series zero-padded to the window (history + live slot), ready for plotting
    pub fn padded(&self, kind: SignalKind) -> Vec<f64> {
        self.signals.padded(kind, self.history.len())
    }

    pub fn candle_count(&self) -> usize {
        self.history.len() + usize::from(self.live.is_some())
    }
}
