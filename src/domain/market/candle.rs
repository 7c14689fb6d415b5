use serde::{Deserialize, Serialize};

/// Immutable snapshot of one time bucket.
///
/// `timestamp` is the bucket start in epoch milliseconds and is unique within a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// Percentage change from open to close, `None` for a zero open
    pub fn change_pct(&self) -> Option<f64> {
        if self.open == 0.0 {
            None
        } else {
            Some((self.close - self.open) / self.open * 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1.0,
            turnover: close,
        }
    }

    #[test]
    fn test_bullish() {
        assert!(candle(100.0, 101.0).is_bullish());
        assert!(candle(100.0, 100.0).is_bullish());
        assert!(!candle(100.0, 99.0).is_bullish());
    }

    #[test]
    fn test_change_pct() {
        let pct = candle(100.0, 102.5).change_pct().unwrap();
        assert!((pct - 2.5).abs() < 1e-9);
        assert!(candle(0.0, 1.0).change_pct().is_none());
    }
}
