//! Boundary Reconciler
//!
//! Decides, for one granularity and one tick, whether the previously live bar
//! has closed. The fetched live candle is compared against the window's live
//! bar:
//! - same bucket: the live bar is still forming and is replaced in place
//! - next bucket: the old live bar settled; its settled values are taken from
//!   the fetched tail and the window advances by exactly one bucket
//! - anything else (stale data, multi-bucket gap, settled bar missing from the
//!   tail) is reported and the window is left untouched
//!
//! Malformed or empty payloads are rejected before the window is touched.

use crate::domain::errors::SyncError;
use crate::domain::market::candle::Candle;
use crate::domain::market::codec;
use crate::domain::market::granularity::Granularity;
use crate::domain::market::window::CandleWindow;
use serde_json::Value;
use tracing::{debug, info};

/// Decoded data of one tick for one granularity
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTick {
    /// Short history tail, oldest first
    pub tail: Vec<Candle>,
    pub live: Candle,
}

impl FetchedTick {
    /// Decodes raw payloads; empty or malformed data is an error
    pub fn decode(tail: &Value, live: &Value) -> Result<Self, SyncError> {
        let tail = codec::decode_many(tail)?;
        if tail.is_empty() {
            return Err(SyncError::EmptyFetch {
                what: "history tail",
            });
        }
        let live = codec::decode_one(live)?.ok_or(SyncError::EmptyFetch {
            what: "live candle",
        })?;
        Ok(Self { tail, live })
    }
}

/// What a reconciliation did to the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Bucket still open, live bar replaced in place
    LiveUpdated,
    /// Bucket closed, window advanced by one bar
    Advanced { settled: Candle, live: Candle },
}

impl Reconciliation {
    pub fn crossed_boundary(&self) -> bool {
        matches!(self, Reconciliation::Advanced { .. })
    }
}

pub struct BoundaryReconciler {
    granularity: Granularity,
}

impl BoundaryReconciler {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }

    /// Applies one tick of fetched data to `window`.
    ///
    /// On error the window is unchanged.
    pub fn reconcile(
        &self,
        window: &mut CandleWindow,
        fetched: FetchedTick,
    ) -> Result<Reconciliation, SyncError> {
        let current_ts = window.live().ok_or(SyncError::Uninitialized)?.timestamp;
        let fetched_ts = fetched.live.timestamp;

        if fetched_ts == current_ts {
            window.replace_live(fetched.live)?;
            debug!(
                "BoundaryReconciler[{}]: live bar {} updated (close={})",
                self.granularity, fetched_ts, fetched.live.close
            );
            return Ok(Reconciliation::LiveUpdated);
        }

        if fetched_ts < current_ts {
            return Err(SyncError::InconsistentBoundary {
                expected: current_ts,
                actual: fetched_ts,
            });
        }

        let settled = fetched
            .tail
            .iter()
            .rev()
            .find(|c| c.timestamp == current_ts)
            .copied()
            .ok_or_else(|| SyncError::InconsistentBoundary {
                expected: current_ts,
                actual: fetched.tail.last().map(|c| c.timestamp).unwrap_or(fetched_ts),
            })?;

        window.close_and_advance(settled, fetched.live)?;
        info!(
            "BoundaryReconciler[{}]: bucket {} closed at {}, new live bucket {}",
            self.granularity, settled.timestamp, settled.close, fetched_ts
        );
        Ok(Reconciliation::Advanced {
            settled,
            live: fetched.live,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bar(timestamp: i64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            turnover: close * 10.0,
        }
    }

    fn window() -> CandleWindow {
        let mut window = CandleWindow::new(3, 100);
        window
            .initialize(vec![bar(100, 1.0), bar(200, 2.0)], Some(bar(300, 3.0)))
            .unwrap();
        window
    }

    fn reconciler() -> BoundaryReconciler {
        BoundaryReconciler::new(Granularity::FifteenMin)
    }

    #[test]
    fn test_same_bucket_replaces_live() {
        let mut window = window();
        let fetched = FetchedTick {
            tail: vec![bar(200, 2.0), bar(300, 3.0)],
            live: bar(300, 3.4),
        };
        let outcome = reconciler().reconcile(&mut window, fetched).unwrap();
        assert_eq!(outcome, Reconciliation::LiveUpdated);
        assert!(!outcome.crossed_boundary());
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.4]);
    }

    #[test]
    fn test_next_bucket_advances_with_settled_values() {
        let mut window = window();
        let fetched = FetchedTick {
            tail: vec![bar(300, 3.2), bar(400, 4.0)],
            live: bar(400, 4.1),
        };
        let outcome = reconciler().reconcile(&mut window, fetched).unwrap();
        assert!(outcome.crossed_boundary());
        let ts: Vec<i64> = window.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![200, 300, 400]);
        assert_eq!(window.settled().unwrap().close, 3.2);
        assert_eq!(window.live().unwrap().close, 4.1);
    }

    #[test]
    fn test_tail_without_live_bar_also_advances() {
        // The terminal API excludes the forming bar from the history tail
        let mut window = window();
        let fetched = FetchedTick {
            tail: vec![bar(200, 2.0), bar(300, 3.3)],
            live: bar(400, 4.0),
        };
        reconciler().reconcile(&mut window, fetched).unwrap();
        assert_eq!(window.settled().unwrap().close, 3.3);
    }

    #[test]
    fn test_multi_bucket_gap_is_reported() {
        let mut window = window();
        let before = window.clone();
        let fetched = FetchedTick {
            tail: vec![bar(300, 3.0), bar(400, 4.0)],
            live: bar(500, 5.0),
        };
        let err = reconciler().reconcile(&mut window, fetched).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InconsistentBoundary { expected: 400, actual: 500 }
        ));
        assert_eq!(window, before);
    }

    #[test]
    fn test_missing_settled_bar_is_reported() {
        let mut window = window();
        let before = window.clone();
        let fetched = FetchedTick {
            tail: vec![bar(400, 4.0), bar(500, 5.0)],
            live: bar(600, 6.0),
        };
        assert!(matches!(
            reconciler().reconcile(&mut window, fetched),
            Err(SyncError::InconsistentBoundary { expected: 300, actual: 500 })
        ));
        assert_eq!(window, before);
    }

    #[test]
    fn test_stale_live_is_reported() {
        let mut window = window();
        let fetched = FetchedTick {
            tail: vec![bar(100, 1.0), bar(200, 2.0)],
            live: bar(200, 2.0),
        };
        assert!(matches!(
            reconciler().reconcile(&mut window, fetched),
            Err(SyncError::InconsistentBoundary { expected: 300, actual: 200 })
        ));
    }

    #[test]
    fn test_decode_rejects_empty_and_malformed() {
        let live = json!(["300", "3", "4", "2", "3", "10", "30"]);
        assert!(matches!(
            FetchedTick::decode(&json!([]), &live),
            Err(SyncError::EmptyFetch { .. })
        ));
        assert!(matches!(
            FetchedTick::decode(&json!([["200", "2", "3", "1", "2", "10", "20"]]), &Value::Null),
            Err(SyncError::EmptyFetch { .. })
        ));
        assert!(matches!(
            FetchedTick::decode(&json!([["200", "2", "3"]]), &live),
            Err(SyncError::Format(_))
        ));

        let fetched =
            FetchedTick::decode(&json!([["200", "2", "3", "1", "2", "10", "20"]]), &live).unwrap();
        assert_eq!(fetched.tail.len(), 1);
        assert_eq!(fetched.live.timestamp, 300);
    }
}
