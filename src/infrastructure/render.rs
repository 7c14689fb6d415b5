use crate::domain::market::signal::SignalKind;
use crate::domain::market::snapshot::ChartSnapshot;
use crate::domain::ports::RenderGate;
use tracing::info;

/// Headless render sink: writes a one-line chart summary per notified change
#[derive(Debug, Default)]
pub struct LoggingRenderGate;

impl LoggingRenderGate {
    pub fn new() -> Self {
        Self
    }

    pub fn describe(snapshot: &ChartSnapshot) -> String {
        let live = match snapshot.live {
            Some(candle) => format!(
                "live {} close={:.4} ({})",
                candle.timestamp,
                candle.close,
                candle
                    .change_pct()
                    .map_or_else(|| "n/a".to_string(), |pct| format!("{:+.2}%", pct))
            ),
            None => "no live bar".to_string(),
        };

        let gauge = |kind: SignalKind| {
            let reading = snapshot.signals.reading(kind);
            match (reading.current, reading.bias()) {
                (Some(value), Some(bias)) => format!("{:.3} {}", value, bias),
                _ => "-".to_string(),
            }
        };

        format!(
            "{} {} | {} candles | {} | primary {} | secondary {}{}",
            snapshot.symbol,
            snapshot.granularity,
            snapshot.candle_count(),
            live,
            gauge(SignalKind::Primary),
            gauge(SignalKind::Secondary),
            if snapshot.forced { " | forced" } else { "" }
        )
    }
}

impl RenderGate for LoggingRenderGate {
    fn on_change(&self, snapshot: &ChartSnapshot) {
        info!("Chart: {}", Self::describe(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::candle::Candle;
    use crate::domain::market::granularity::Granularity;
    use crate::domain::market::signal::SignalSeries;

    #[test]
    fn test_describe() {
        let live = Candle {
            timestamp: 3_600_000,
            open: 100.0,
            high: 103.0,
            low: 99.0,
            close: 102.0,
            volume: 5.0,
            turnover: 510.0,
        };
        let snapshot = ChartSnapshot {
            symbol: "BTCUSDT".to_string(),
            granularity: Granularity::OneHour,
            history: vec![live; 3],
            live: Some(live),
            signals: SignalSeries::new(vec![0.2, 0.81], Vec::new()),
            forced: true,
        };

        let line = LoggingRenderGate::describe(&snapshot);
        assert_eq!(
            line,
            "BTCUSDT 1h | 4 candles | live 3600000 close=102.0000 (+2.00%) | primary 0.810 bullish | secondary - | forced"
        );
    }
}
