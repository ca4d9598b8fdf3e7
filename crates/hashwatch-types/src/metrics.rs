use serde::{Deserialize, Serialize};

/// One raw time-series row as reported by `/api/metrics`.
///
/// The timestamp is kept as the server's ISO-8601 string: rows with an
/// unparsable timestamp are dropped individually during aggregation
/// instead of failing the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: String,
    pub ip: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub hashrate_ths: f64,
    #[serde(default)]
    pub power_w: f64,
    #[serde(default)]
    pub avg_temp_c: f64,
    #[serde(default)]
    pub avg_fan_rpm: f64,
}

/// Farm-wide (or single-miner, when queried with `?ip=`) rollup from `/api/summary`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FarmSummary {
    #[serde(default)]
    pub total_power: f64,
    #[serde(default)]
    pub total_hashrate: f64,
    /// Accumulated uptime in seconds.
    #[serde(default)]
    pub total_uptime: u64,
    #[serde(default)]
    pub avg_temp: f64,
    #[serde(default)]
    pub avg_fan_speed: f64,
    #[serde(default)]
    pub total_workers: u32,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Current-state row for one miner, re-fetched wholesale each poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerStatusRow {
    pub ip: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub est_power_w: Option<f64>,
    #[serde(default)]
    pub hashrate_ths: f64,
    #[serde(default)]
    pub avg_temp_c: f64,
    #[serde(default)]
    pub avg_fan_rpm: f64,
    /// Seconds since the miner last reported; `None` when never seen.
    #[serde(default)]
    pub age_sec: Option<u64>,
}

/// One stratum pool entry from `/api/miners/{ip}/pools`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolRow {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub prio: Option<u32>,
    #[serde(default)]
    pub stratum_active: Option<bool>,
    #[serde(default)]
    pub accepted: u64,
    #[serde(default)]
    pub rejected: u64,
    #[serde(default)]
    pub stale: u64,
    #[serde(default)]
    pub reject_percent: f64,
}

/// One log line from `/api/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: String,
    #[serde(default)]
    pub miner_ip: Option<String>,
    pub level: String,
    #[serde(default)]
    pub source: String,
    pub message: String,
}

impl LogEvent {
    /// Normalized severity bucket used for coloring; the server emits a
    /// mixture of `WARN`/`WARNING` spellings.
    pub fn severity(&self) -> LogSeverity {
        match self.level.to_ascii_uppercase().as_str() {
            "ERROR" => LogSeverity::Error,
            "WARN" | "WARNING" => LogSeverity::Warn,
            _ => LogSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Info,
    Warn,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miner_row_tolerates_sparse_payload() {
        let row: MinerStatusRow =
            serde_json::from_str(r#"{"ip": "10.0.0.7"}"#).expect("parse sparse row");
        assert_eq!(row.ip, "10.0.0.7");
        assert!(row.model.is_none());
        assert!(row.age_sec.is_none());
        assert_eq!(row.hashrate_ths, 0.0);
    }

    #[test]
    fn log_event_normalizes_warn_spellings() {
        let make = |level: &str| LogEvent {
            timestamp: "2024-05-01T00:00:00Z".into(),
            miner_ip: None,
            level: level.into(),
            source: "poller".into(),
            message: "m".into(),
        };
        assert_eq!(make("WARNING").severity(), LogSeverity::Warn);
        assert_eq!(make("warn").severity(), LogSeverity::Warn);
        assert_eq!(make("ERROR").severity(), LogSeverity::Error);
        assert_eq!(make("debug").severity(), LogSeverity::Info);
    }
}
