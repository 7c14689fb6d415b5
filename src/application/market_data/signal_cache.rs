use crate::domain::errors::SyncError;
use crate::domain::market::codec;
use crate::domain::market::granularity::Granularity;
use crate::domain::market::signal::{SignalKind, SignalNames, SignalSeries};
use crate::domain::market::window::CandleWindow;
use crate::domain::ports::PredictionClient;
use std::sync::Arc;
use tracing::{debug, warn};

/// Latest signal series of one granularity plus the primary value last handed to the renderer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalCache {
    series: SignalSeries,
    last_seen_primary: Option<f64>,
}

impl SignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self) -> &SignalSeries {
        &self.series
    }

    pub fn latest_primary(&self) -> Option<f64> {
        self.series.latest(SignalKind::Primary)
    }

    /// Replaces the series wholesale
    pub fn replace(&mut self, series: SignalSeries) {
        self.series = series;
    }

    /// Whether the latest primary value differs from the one last marked as seen
    pub fn primary_changed(&self) -> bool {
        self.latest_primary() != self.last_seen_primary
    }

    pub fn mark_seen(&mut self) {
        self.last_seen_primary = self.latest_primary();
    }
}

/// Runs the remote prediction for a window snapshot.
///
/// Computing is separated from committing: callers apply the returned series
/// to their [`SignalCache`] only on success, so a remote failure leaves the
/// previous series in place.
#[derive(Clone)]
pub struct SignalRecomputer {
    client: Arc<dyn PredictionClient>,
    names: SignalNames,
}

impl SignalRecomputer {
    pub fn new(client: Arc<dyn PredictionClient>, names: SignalNames) -> Self {
        Self { client, names }
    }

    pub async fn compute(
        &self,
        granularity: Granularity,
        window: &CandleWindow,
    ) -> Result<SignalSeries, SyncError> {
        let wire = codec::encode_all(&window.to_vec())?;
        let markers = vec![self.names.marker(granularity)];

        let response = self
            .client
            .fetch_signals(&wire, &markers)
            .await
            .map_err(SyncError::fetch)?;

        let series = SignalSeries::from_response(&response, &self.names, granularity);
        if series.is_empty() {
            warn!(
                "SignalRecomputer[{}]: response carried none of the tracked series ({} keys)",
                granularity,
                response.len()
            );
        } else {
            debug!(
                "SignalRecomputer[{}]: {} candles -> primary={:?}",
                granularity,
                wire.len(),
                series.latest(SignalKind::Primary)
            );
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::candle::Candle;
    use crate::domain::market::codec::WireCandle;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubPrediction {
        response: Option<HashMap<String, Vec<f64>>>,
        requests: Mutex<Vec<(usize, Vec<String>)>>,
    }

    #[async_trait]
    impl PredictionClient for StubPrediction {
        async fn fetch_signals(
            &self,
            candles: &[WireCandle],
            markers: &[String],
        ) -> anyhow::Result<HashMap<String, Vec<f64>>> {
            self.requests
                .lock()
                .unwrap()
                .push((candles.len(), markers.to_vec()));
            self.response
                .clone()
                .ok_or_else(|| anyhow::anyhow!("model server unavailable"))
        }
    }

    fn window() -> CandleWindow {
        let bar = |timestamp: i64, close: f64| Candle {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            turnover: close,
        };
        let mut window = CandleWindow::for_granularity(3, Granularity::OneHour);
        window
            .initialize(vec![bar(0, 1.0), bar(3_600_000, 2.0)], Some(bar(7_200_000, 3.0)))
            .unwrap();
        window
    }

    #[tokio::test]
    async fn test_compute_replaces_series_wholesale() {
        let mut response = HashMap::new();
        response.insert("xgb_linear-H1_PerfectTrend-p4".to_string(), vec![0.3, 0.8]);
        let stub = Arc::new(StubPrediction {
            response: Some(response),
            requests: Mutex::new(Vec::new()),
        });
        let recomputer = SignalRecomputer::new(stub.clone(), SignalNames::default());
        let mut cache = SignalCache::new();
        cache.replace(SignalSeries::new(vec![0.1], vec![0.9]));

        let series = recomputer
            .compute(Granularity::OneHour, &window())
            .await
            .unwrap();
        cache.replace(series);

        assert_eq!(cache.latest_primary(), Some(0.8));
        assert!(cache.series().series(SignalKind::Secondary).is_empty());
        let requests = stub.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], (3, vec!["xgb_linear-H1_".to_string()]));
    }

    #[tokio::test]
    async fn test_failed_compute_is_a_fetch_failure() {
        let stub = Arc::new(StubPrediction {
            response: None,
            requests: Mutex::new(Vec::new()),
        });
        let recomputer = SignalRecomputer::new(stub.clone(), SignalNames::default());

        let err = recomputer
            .compute(Granularity::OneHour, &window())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::FetchFailure { .. }));
        assert!(err.to_string().contains("model server unavailable"));
        assert_eq!(stub.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_change_detection() {
        let mut cache = SignalCache::new();
        assert!(!cache.primary_changed());

        cache.replace(SignalSeries::new(vec![0.7], Vec::new()));
        assert!(cache.primary_changed());
        cache.mark_seen();
        assert!(!cache.primary_changed());

        cache.replace(SignalSeries::new(vec![0.2, 0.7], Vec::new()));
        assert!(!cache.primary_changed());

        cache.replace(SignalSeries::new(vec![0.7, 0.1], Vec::new()));
        assert!(cache.primary_changed());
    }
}
