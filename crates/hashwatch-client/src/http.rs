use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use hashwatch_types::{
    config::FarmConfig,
    metrics::{FarmSummary, LogEvent, MetricSample, MinerStatusRow, PoolRow},
    Result,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{client_error, ClientStats, EventFilter, FarmApi, MetricsQuery};

pub struct HttpFarmClient {
    base_url: String,
    http: reqwest::Client,
    stats: Arc<Mutex<ClientStats>>,
}

/// `/api/miners` responds with either `{ "miners": [...] }` or a bare
/// array depending on server version; accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum MinersBody {
    Wrapped { miners: Vec<MinerStatusRow> },
    Bare(Vec<MinerStatusRow>),
}

#[derive(Deserialize)]
struct PoolsBody {
    #[serde(default)]
    pools: Vec<PoolRow>,
}

/// A non-array metrics body renders as an empty chart, not an error.
#[derive(Deserialize)]
#[serde(untagged)]
enum MetricsBody {
    Rows(Vec<MetricSample>),
    Other(serde_json::Value),
}

impl HttpFarmClient {
    pub fn new(config: &FarmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| client_error(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            stats: Arc::new(Mutex::new(ClientStats::default())),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();
        let outcome = async {
            let response = self
                .http
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|err| client_error(format!("GET {path} failed: {err}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(client_error(format!("GET {path} returned HTTP {status}")));
            }
            response
                .json::<T>()
                .await
                .map_err(|err| client_error(format!("GET {path}: invalid body: {err}")))
        }
        .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if let Ok(mut stats) = self.stats.lock() {
            match &outcome {
                Ok(_) => {
                    stats.successful_requests += 1;
                    stats.last_latency_ms = Some(elapsed_ms);
                }
                Err(_) => stats.failed_requests += 1,
            }
        }
        outcome
    }
}

#[async_trait]
impl FarmApi for HttpFarmClient {
    async fn fetch_summary(&self, ip: Option<&str>) -> Result<FarmSummary> {
        let mut query = Vec::new();
        if let Some(ip) = ip {
            query.push(("ip", ip.to_string()));
        }
        self.get_json("/api/summary", &query).await
    }

    async fn fetch_metrics(&self, params: &MetricsQuery) -> Result<Vec<MetricSample>> {
        let mut query = vec![
            ("since", params.since.to_rfc3339()),
            ("limit", params.limit.to_string()),
        ];
        match &params.ip {
            Some(ip) => query.push(("ip", ip.clone())),
            None => {
                query.push(("active_only", params.active_only.to_string()));
                query.push(("fresh_within", params.fresh_within_mins.to_string()));
            }
        }
        let body: MetricsBody = self.get_json("/api/metrics", &query).await?;
        Ok(match body {
            MetricsBody::Rows(rows) => rows,
            MetricsBody::Other(_) => Vec::new(),
        })
    }

    async fn fetch_miners(&self) -> Result<Vec<MinerStatusRow>> {
        let body: MinersBody = self.get_json("/api/miners", &[]).await?;
        Ok(match body {
            MinersBody::Wrapped { miners } => miners,
            MinersBody::Bare(rows) => rows,
        })
    }

    async fn fetch_current(
        &self,
        active_only: bool,
        fresh_within_mins: u32,
    ) -> Result<Vec<MinerStatusRow>> {
        let query = vec![
            ("active_only", active_only.to_string()),
            ("fresh_within", fresh_within_mins.to_string()),
        ];
        self.get_json("/api/miners/current", &query).await
    }

    async fn fetch_pools(&self, ip: &str) -> Result<Vec<PoolRow>> {
        let body: PoolsBody = self
            .get_json(&format!("/api/miners/{ip}/pools"), &[])
            .await?;
        Ok(body.pools)
    }

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<LogEvent>> {
        let mut query = Vec::new();
        if let Some(ip) = &filter.ip {
            query.push(("ip", ip.clone()));
        }
        if let Some(level) = &filter.level {
            query.push(("level", level.clone()));
        }
        if let Some(since) = &filter.since {
            query.push(("since", since.to_rfc3339()));
        }
        self.get_json("/api/events", &query).await
    }

    fn stats(&self) -> ClientStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miners_body_accepts_both_envelopes() {
        let wrapped: MinersBody =
            serde_json::from_str(r#"{"miners": [{"ip": "10.0.0.1"}]}"#).expect("wrapped");
        let bare: MinersBody = serde_json::from_str(r#"[{"ip": "10.0.0.2"}]"#).expect("bare");
        let count = |body: MinersBody| match body {
            MinersBody::Wrapped { miners } => miners.len(),
            MinersBody::Bare(rows) => rows.len(),
        };
        assert_eq!(count(wrapped), 1);
        assert_eq!(count(bare), 1);
    }

    #[test]
    fn non_array_metrics_body_collapses_to_empty() {
        let body: MetricsBody =
            serde_json::from_str(r#"{"error": "no samples"}"#).expect("parse object body");
        assert!(matches!(body, MetricsBody::Other(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpFarmClient::new(&FarmConfig {
            base_url: "http://127.0.0.1:8080/".into(),
            ip: None,
            request_timeout_secs: 5,
        })
        .expect("build client");
        assert_eq!(client.base_url, "http://127.0.0.1:8080");
    }
}
