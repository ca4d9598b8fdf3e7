use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chart-ready point: the bin's start time and its per-series values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub bucket: DateTime<Utc>,
    pub hashrate_ths: f64,
    pub power_w: f64,
    pub avg_temp_c: f64,
    pub avg_fan_rpm: f64,
}

/// An aggregated chart series, sorted by ascending bucket.
///
/// Bins are ephemeral: the poller rebuilds the whole series every cycle
/// and renderers replace their state wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmSeries {
    pub bin_minutes: u32,
    pub points: Vec<SeriesPoint>,
}

impl FarmSeries {
    pub fn empty(bin_minutes: u32) -> Self {
        Self {
            bin_minutes,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Current BTC price snapshot for the price widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BtcTicker {
    pub price_usd: f64,
    pub change_24h_pct: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

/// One historical close for the price sparkline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub at: DateTime<Utc>,
    pub price_usd: f64,
}
