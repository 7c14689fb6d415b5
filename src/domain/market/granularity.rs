use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time-bucket aggregation level tracked by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    FifteenMin,
    OneHour,
}

impl Granularity {
    /// Returns the bucket length in minutes
    pub fn minutes(&self) -> u32 {
        match self {
            Granularity::FifteenMin => 15,
            Granularity::OneHour => 60,
        }
    }

    /// Returns the bucket length in milliseconds (candle timestamps are epoch ms)
    pub fn interval_ms(&self) -> i64 {
        i64::from(self.minutes()) * 60 * 1000
    }

    /// Interval code understood by the terminal web API (`i` query parameter)
    pub fn api_code(&self) -> &'static str {
        match self {
            Granularity::FifteenMin => "15",
            Granularity::OneHour => "60",
        }
    }

    /// Short code used in model names, e.g. `xgb_linear-H1_PerfectTrend-p4`
    pub fn display_code(&self) -> &'static str {
        match self {
            Granularity::FifteenMin => "M15",
            Granularity::OneHour => "H1",
        }
    }

    /// Both tracked granularities, hourly first
    pub fn all() -> [Granularity; 2] {
        [Granularity::OneHour, Granularity::FifteenMin]
    }
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "15m" | "15min" | "m15" | "15" | "fifteenmin" => Ok(Granularity::FifteenMin),
            "1h" | "1hour" | "h1" | "60" | "onehour" => Ok(Granularity::OneHour),
            _ => Err(anyhow!(
                "Invalid granularity: '{}'. Valid options: 15m, 1h (or M15, H1, 15, 60)",
                s
            )),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::FifteenMin => write!(f, "15m"),
            Granularity::OneHour => write!(f, "1h"),
        }
    }
}
