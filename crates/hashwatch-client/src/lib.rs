//! Farm monitoring API client abstraction layer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hashwatch_types::{
    config::FarmConfig,
    metrics::{FarmSummary, LogEvent, MetricSample, MinerStatusRow, PoolRow},
    HashwatchError, Result,
};
use tokio::time::sleep;
use tracing::info;

mod http;
mod price;

pub use http::HttpFarmClient;
pub use price::{PriceFeed, PublicPriceFeed};

/// Query parameters for `/api/metrics`.
///
/// Single-miner queries carry an `ip`; farm-wide queries carry the
/// active-only filter and freshness window instead, matching how the
/// dashboard builds its query strings.
#[derive(Debug, Clone)]
pub struct MetricsQuery {
    pub since: DateTime<Utc>,
    pub limit: u32,
    pub ip: Option<String>,
    pub active_only: bool,
    pub fresh_within_mins: u32,
}

impl MetricsQuery {
    pub fn farm(since: DateTime<Utc>, limit: u32, active_only: bool, fresh_within_mins: u32) -> Self {
        Self {
            since,
            limit,
            ip: None,
            active_only,
            fresh_within_mins,
        }
    }

    pub fn miner(since: DateTime<Utc>, limit: u32, ip: impl Into<String>) -> Self {
        Self {
            since,
            limit,
            ip: Some(ip.into()),
            active_only: false,
            fresh_within_mins: 0,
        }
    }
}

/// Optional filters for `/api/events`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub ip: Option<String>,
    pub level: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Aggregated request counters.
#[derive(Debug, Default, Clone)]
pub struct ClientStats {
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_latency_ms: Option<u64>,
}

#[async_trait]
pub trait FarmApi: Send + Sync {
    async fn fetch_summary(&self, ip: Option<&str>) -> Result<FarmSummary>;
    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>>;
    async fn fetch_miners(&self) -> Result<Vec<MinerStatusRow>>;
    async fn fetch_current(
        &self,
        active_only: bool,
        fresh_within_mins: u32,
    ) -> Result<Vec<MinerStatusRow>>;
    async fn fetch_pools(&self, ip: &str) -> Result<Vec<PoolRow>>;
    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<LogEvent>>;
    fn stats(&self) -> ClientStats;
}

/// Deterministic in-process client used for integration runs and tests.
pub struct MockFarmClient {
    miners: Vec<MockMiner>,
    stats: Arc<Mutex<ClientStats>>,
}

struct MockMiner {
    ip: &'static str,
    model: &'static str,
    hashrate_ths: f64,
    power_w: f64,
    temp_c: f64,
    fan_rpm: f64,
    age_sec: u64,
}

impl MockFarmClient {
    pub fn new(_config: FarmConfig) -> Self {
        Self {
            miners: vec![
                MockMiner {
                    ip: "10.0.0.11",
                    model: "Antminer S19",
                    hashrate_ths: 94.8,
                    power_w: 3250.0,
                    temp_c: 62.5,
                    fan_rpm: 4980.0,
                    age_sec: 8,
                },
                MockMiner {
                    ip: "10.0.0.12",
                    model: "Antminer S19 Pro",
                    hashrate_ths: 108.2,
                    power_w: 3400.0,
                    temp_c: 65.0,
                    fan_rpm: 5120.0,
                    age_sec: 12,
                },
                MockMiner {
                    ip: "10.0.0.13",
                    model: "Whatsminer M30S",
                    hashrate_ths: 86.0,
                    power_w: 3268.0,
                    temp_c: 0.0,
                    fan_rpm: 4470.0,
                    age_sec: 400,
                },
            ],
            stats: Arc::new(Mutex::new(ClientStats::default())),
        }
    }

    fn record_success(&self, latency_ms: u64) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.successful_requests += 1;
            stats.last_latency_ms = Some(latency_ms);
        }
    }

    fn status_rows(&self, fresh_within_mins: u32, active_only: bool) -> Vec<MinerStatusRow> {
        let now = Utc::now();
        self.miners
            .iter()
            .filter(|m| !active_only || m.age_sec <= u64::from(fresh_within_mins) * 60)
            .map(|m| MinerStatusRow {
                ip: m.ip.into(),
                model: Some(m.model.into()),
                status: Some(if m.age_sec <= 30 { "mining" } else { "stale" }.into()),
                last_seen: Some(
                    (now - Duration::seconds(m.age_sec as i64)).to_rfc3339(),
                ),
                est_power_w: Some(m.power_w),
                hashrate_ths: m.hashrate_ths,
                avg_temp_c: m.temp_c,
                avg_fan_rpm: m.fan_rpm,
                age_sec: Some(m.age_sec),
            })
            .collect()
    }
}

#[async_trait]
impl FarmApi for MockFarmClient {
    async fn fetch_summary(&self, ip: Option<&str>) -> Result<FarmSummary> {
        info!("Mock summary fetch (ip={:?})", ip);
        sleep(tokio::time::Duration::from_millis(5)).await;
        let selected: Vec<&MockMiner> = match ip {
            Some(ip) => self.miners.iter().filter(|m| m.ip == ip).collect(),
            None => self.miners.iter().collect(),
        };
        let warm: Vec<&&MockMiner> = selected.iter().filter(|m| m.temp_c > 0.0).collect();
        let summary = FarmSummary {
            total_power: selected.iter().map(|m| m.power_w).sum(),
            total_hashrate: selected.iter().map(|m| m.hashrate_ths).sum(),
            total_uptime: 86_400 * 3 + 4_520,
            avg_temp: if warm.is_empty() {
                0.0
            } else {
                warm.iter().map(|m| m.temp_c).sum::<f64>() / warm.len() as f64
            },
            avg_fan_speed: selected.iter().map(|m| m.fan_rpm).sum::<f64>()
                / selected.len().max(1) as f64,
            total_workers: selected.len() as u32,
            last_updated: Some(Utc::now().to_rfc3339()),
        };
        self.record_success(5);
        Ok(summary)
    }

    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>> {
        sleep(tokio::time::Duration::from_millis(5)).await;
        let mut rows = Vec::new();
        let span_secs = (Utc::now() - query.since).num_seconds().max(0);
        // One row per miner per minute over the requested window.
        let steps = (span_secs / 60).min(i64::from(query.limit));
        for step in 0..steps {
            let at = query.since + Duration::seconds(step * 60);
            for (idx, miner) in self.miners.iter().enumerate() {
                if let Some(ip) = &query.ip {
                    if miner.ip != ip {
                        continue;
                    }
                }
                // Deterministic drift so charts have visible shape.
                let wobble = ((step + idx as i64) % 7) as f64 * 0.4;
                rows.push(MetricSample {
                    timestamp: at.to_rfc3339(),
                    ip: miner.ip.into(),
                    model: Some(miner.model.into()),
                    hashrate_ths: miner.hashrate_ths + wobble,
                    power_w: miner.power_w + wobble * 10.0,
                    avg_temp_c: miner.temp_c,
                    avg_fan_rpm: miner.fan_rpm,
                });
                if rows.len() as u32 >= query.limit {
                    break;
                }
            }
            if rows.len() as u32 >= query.limit {
                break;
            }
        }
        self.record_success(5);
        Ok(rows)
    }

    async fn fetch_miners(&self) -> Result<Vec<MinerStatusRow>> {
        sleep(tokio::time::Duration::from_millis(5)).await;
        let rows = self.status_rows(u32::MAX / 60, false);
        self.record_success(5);
        Ok(rows)
    }

    async fn fetch_current(
        &self,
        active_only: bool,
        fresh_within_mins: u32,
    ) -> Result<Vec<MinerStatusRow>> {
        sleep(tokio::time::Duration::from_millis(5)).await;
        let rows = self.status_rows(fresh_within_mins, active_only);
        self.record_success(5);
        Ok(rows)
    }

    async fn fetch_pools(&self, ip: &str) -> Result<Vec<PoolRow>> {
        sleep(tokio::time::Duration::from_millis(5)).await;
        if !self.miners.iter().any(|m| m.ip == ip) {
            return Err(client_error(format!("unknown miner {ip}")));
        }
        self.record_success(5);
        Ok(vec![
            PoolRow {
                id: Some(0),
                url: Some("stratum+tcp://pool.example.com:3333".into()),
                user: Some("worker.1".into()),
                status: Some("Alive".into()),
                prio: Some(0),
                stratum_active: Some(true),
                accepted: 48_210,
                rejected: 96,
                stale: 12,
                reject_percent: 0.2,
            },
            PoolRow {
                id: Some(1),
                url: Some("stratum+tcp://backup.example.com:3333".into()),
                user: Some("worker.1".into()),
                status: Some("Alive".into()),
                prio: Some(1),
                stratum_active: Some(false),
                ..PoolRow::default()
            },
        ])
    }

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<LogEvent>> {
        sleep(tokio::time::Duration::from_millis(5)).await;
        let now = Utc::now();
        let entries = vec![
            LogEvent {
                timestamp: (now - Duration::minutes(2)).to_rfc3339(),
                miner_ip: Some("10.0.0.13".into()),
                level: "WARN".into(),
                source: "poller".into(),
                message: "miner stopped reporting".into(),
            },
            LogEvent {
                timestamp: (now - Duration::minutes(9)).to_rfc3339(),
                miner_ip: None,
                level: "INFO".into(),
                source: "scheduler".into(),
                message: "metrics sweep completed".into(),
            },
        ];
        let entries = entries
            .into_iter()
            .filter(|e| match &filter.ip {
                Some(ip) => e.miner_ip.as_deref() == Some(ip.as_str()),
                None => true,
            })
            .filter(|e| match &filter.level {
                Some(level) => e.level.eq_ignore_ascii_case(level),
                None => true,
            })
            .collect();
        self.record_success(5);
        Ok(entries)
    }

    fn stats(&self) -> ClientStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Generate an error aligned with client semantics.
pub fn client_error(message: impl Into<String>) -> HashwatchError {
    HashwatchError::Client(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock() -> MockFarmClient {
        MockFarmClient::new(FarmConfig {
            base_url: "http://127.0.0.1:8080".into(),
            ip: None,
            request_timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn summary_scopes_to_single_miner() {
        let client = mock();
        let farm = client.fetch_summary(None).await.expect("farm summary");
        let one = client
            .fetch_summary(Some("10.0.0.11"))
            .await
            .expect("miner summary");
        assert_eq!(one.total_workers, 1);
        assert!(farm.total_hashrate > one.total_hashrate);
        assert!((one.total_power - 3250.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn current_rows_respect_freshness_filter() {
        let client = mock();
        let all = client.fetch_current(false, 30).await.expect("all rows");
        assert_eq!(all.len(), 3);
        // 10.0.0.13 is 400s old and drops out of a 5-minute window.
        let active = client.fetch_current(true, 5).await.expect("active rows");
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|r| r.ip != "10.0.0.13"));
    }

    #[tokio::test]
    async fn metrics_query_scopes_to_ip() {
        let client = mock();
        let since = Utc::now() - Duration::minutes(10);
        let query = MetricsQuery::miner(since, 500, "10.0.0.12");
        let rows = client.fetch_metrics(&query).await.expect("metrics");
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.ip == "10.0.0.12"));
    }

    #[tokio::test]
    async fn stats_count_successes() {
        let client = mock();
        client.fetch_miners().await.expect("miners");
        client.fetch_miners().await.expect("miners");
        assert_eq!(client.stats().successful_requests, 2);
    }
}
