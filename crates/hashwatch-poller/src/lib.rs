//! Polling orchestrator: fetch, transform, publish, on a fixed cadence.
//!
//! Each cycle is one firing of the dashboard refresh timer. The
//! widget sections run in order and degrade independently: a failed
//! fetch logs a warning and publishes that widget's placeholder payload,
//! never aborting the cycle or the loop.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hashwatch_aggregate::{bin_series, raw_series};
use hashwatch_client::{EventFilter, FarmApi, MetricsQuery, PriceFeed};
use hashwatch_network::DashboardBus;
use hashwatch_ops::{ensure_state_dir, EventJournal};
use hashwatch_types::{
    config::{HashwatchConfig, PollerConfig},
    events::{
        EventKind, EventPayload, LifecycleEvent, LifecyclePhase, LogBatchEvent, MinersEvent,
        PoolsEvent, PriceEvent, SeriesEvent, SummaryEvent, SystemEvent,
    },
    prefs::UiPrefs,
    series::FarmSeries,
    HashwatchError, Result,
};
use tokio::{
    sync::watch,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub struct Poller<C, P, N>
where
    C: FarmApi,
    P: PriceFeed,
    N: DashboardBus,
{
    client: C,
    price: Option<P>,
    bus: N,
    journal: EventJournal,
    config: PollerConfig,
    /// Single-miner mode when set; farm-wide otherwise.
    focused_ip: Option<String>,
    prefs_rx: watch::Receiver<UiPrefs>,
}

enum Wake {
    Tick,
    Prefs,
    PrefsClosed,
    Shutdown,
}

impl<C, P, N> Poller<C, P, N>
where
    C: FarmApi,
    P: PriceFeed,
    N: DashboardBus,
{
    pub fn new(
        config: PollerConfig,
        focused_ip: Option<String>,
        client: C,
        price: Option<P>,
        bus: N,
        journal: EventJournal,
        prefs_rx: watch::Receiver<UiPrefs>,
    ) -> Self {
        Self {
            client,
            price,
            bus,
            journal,
            config,
            focused_ip,
            prefs_rx,
        }
    }

    pub async fn boot(&mut self, full_config: &HashwatchConfig) -> Result<()> {
        ensure_state_dir(&full_config.ops.state_dir)?;

        let lifecycle = SystemEvent::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase: LifecyclePhase::Boot,
                details: Some("poller boot complete".into()),
            }),
        );
        self.publish(lifecycle).await?;
        Ok(())
    }

    /// One timer firing: refresh every widget.
    pub async fn poll_cycle(&mut self) -> Result<()> {
        let prefs = *self.prefs_rx.borrow();
        self.refresh_summary().await?;
        self.refresh_series(&prefs).await?;
        self.refresh_miners(&prefs).await?;
        self.refresh_pools().await?;
        self.refresh_log(&prefs).await?;
        self.refresh_price(&prefs).await?;
        Ok(())
    }

    async fn refresh_summary(&self) -> Result<()> {
        let summary = match self.client.fetch_summary(self.focused_ip.as_deref()).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!("summary fetch failed: {err}");
                None
            }
        };
        self.publish(SystemEvent::new(
            EventKind::Summary,
            EventPayload::Summary(SummaryEvent {
                summary,
                focused_ip: self.focused_ip.clone(),
            }),
        ))
        .await
    }

    async fn refresh_series(&self, prefs: &UiPrefs) -> Result<()> {
        let since = Utc::now() - ChronoDuration::hours(i64::from(prefs.chart_hours));
        let query = match &self.focused_ip {
            Some(ip) => MetricsQuery::miner(since, self.config.sample_limit, ip.clone()),
            None => MetricsQuery::farm(
                since,
                self.config.sample_limit,
                prefs.active_only,
                prefs.fresh_within_mins,
            ),
        };
        let (series, sample_count) = match self.client.fetch_metrics(&query).await {
            Ok(rows) => {
                let series = if self.focused_ip.is_some() {
                    raw_series(&rows)
                } else {
                    bin_series(&rows, self.config.bin_minutes)
                };
                (series, rows.len())
            }
            Err(err) => {
                warn!("metrics fetch failed: {err}");
                (FarmSeries::empty(self.config.bin_minutes), 0)
            }
        };
        debug!(
            "series refresh: {} samples -> {} points",
            sample_count,
            series.points.len()
        );
        self.publish(SystemEvent::new(
            EventKind::Series,
            EventPayload::Series(SeriesEvent {
                series,
                sample_count,
            }),
        ))
        .await
    }

    async fn refresh_miners(&self, prefs: &UiPrefs) -> Result<()> {
        let fetched = match &self.focused_ip {
            Some(ip) => self
                .client
                .fetch_miners()
                .await
                .map(|rows| rows.into_iter().filter(|r| &r.ip == ip).collect()),
            None => {
                self.client
                    .fetch_current(prefs.active_only, prefs.fresh_within_mins)
                    .await
            }
        };
        let rows = match fetched {
            Ok(rows) => rows,
            Err(err) => {
                warn!("miner rows fetch failed: {err}");
                Vec::new()
            }
        };
        self.publish(SystemEvent::new(
            EventKind::Miners,
            EventPayload::Miners(MinersEvent { rows }),
        ))
        .await
    }

    async fn refresh_pools(&self) -> Result<()> {
        let Some(ip) = &self.focused_ip else {
            return Ok(());
        };
        let pools = match self.client.fetch_pools(ip).await {
            Ok(pools) => pools,
            Err(err) => {
                warn!("pools fetch failed for {ip}: {err}");
                Vec::new()
            }
        };
        self.publish(SystemEvent::new(
            EventKind::Pools,
            EventPayload::Pools(PoolsEvent {
                ip: ip.clone(),
                pools,
            }),
        ))
        .await
    }

    async fn refresh_log(&self, prefs: &UiPrefs) -> Result<()> {
        let filter = EventFilter {
            ip: self.focused_ip.clone(),
            level: None,
            since: Some(Utc::now() - ChronoDuration::hours(i64::from(prefs.chart_hours))),
        };
        let entries = match self.client.fetch_events(&filter).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("event log fetch failed: {err}");
                Vec::new()
            }
        };
        self.publish(SystemEvent::new(
            EventKind::Log,
            EventPayload::Log(LogBatchEvent { entries }),
        ))
        .await
    }

    async fn refresh_price(&self, prefs: &UiPrefs) -> Result<()> {
        let Some(feed) = &self.price else {
            return Ok(());
        };
        let ticker = match feed.fetch_ticker().await {
            Ok(ticker) => Some(ticker),
            Err(err) => {
                warn!("price fetch failed: {err}");
                None
            }
        };
        let history = match feed.fetch_history(prefs.chart_hours).await {
            Ok(history) => history,
            Err(err) => {
                warn!("price history fetch failed: {err}");
                Vec::new()
            }
        };
        self.publish(SystemEvent::new(
            EventKind::Price,
            EventPayload::Price(PriceEvent { ticker, history }),
        ))
        .await
    }

    async fn publish(&self, event: SystemEvent) -> Result<()> {
        self.journal.record_event(event.clone()).await;
        self.bus.publish(event).await
    }
}

#[async_trait]
pub trait PollRunner {
    /// Poll until the shutdown flag flips (or its sender goes away).
    async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()>;
}

#[async_trait]
impl<C, P, N> PollRunner for Poller<C, P, N>
where
    C: FarmApi + Send + Sync,
    P: PriceFeed + Send + Sync,
    N: DashboardBus + Send + Sync,
{
    async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.publish(SystemEvent::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase: LifecyclePhase::Ready,
                details: Some(format!("polling every {}s", self.config.interval_secs)),
            }),
        ))
        .await?;

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut prefs_alive = true;

        loop {
            let wake = tokio::select! {
                _ = ticker.tick() => Wake::Tick,
                changed = self.prefs_rx.changed(), if prefs_alive => match changed {
                    Ok(()) => Wake::Prefs,
                    Err(_) => Wake::PrefsClosed,
                },
                _ = shutdown_requested(&mut shutdown) => Wake::Shutdown,
            };
            match wake {
                Wake::Shutdown => break,
                Wake::PrefsClosed => {
                    prefs_alive = false;
                    continue;
                }
                Wake::Prefs => {
                    info!("preferences changed; refreshing now");
                    ticker.reset();
                    self.poll_cycle().await?;
                }
                Wake::Tick => self.poll_cycle().await?,
            }
        }

        self.publish(SystemEvent::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase: LifecyclePhase::Shutdown,
                details: None,
            }),
        ))
        .await?;
        Ok(())
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        // A dropped sender means the front-end is gone; stop polling too.
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub fn poller_error(message: impl Into<String>) -> HashwatchError {
    HashwatchError::Poller(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashwatch_client::{client_error, ClientStats, MockFarmClient, PublicPriceFeed};
    use hashwatch_network::LocalBus;
    use hashwatch_types::config::FarmConfig;
    use hashwatch_types::metrics::{FarmSummary, LogEvent, MetricSample, MinerStatusRow, PoolRow};

    struct FailingClient;

    #[async_trait]
    impl FarmApi for FailingClient {
        async fn fetch_summary(&self, _ip: Option<&str>) -> Result<FarmSummary> {
            Err(client_error("connection refused"))
        }
        async fn fetch_metrics(&self, _query: &MetricsQuery) -> Result<Vec<MetricSample>> {
            Err(client_error("connection refused"))
        }
        async fn fetch_miners(&self) -> Result<Vec<MinerStatusRow>> {
            Err(client_error("connection refused"))
        }
        async fn fetch_current(
            &self,
            _active_only: bool,
            _fresh_within_mins: u32,
        ) -> Result<Vec<MinerStatusRow>> {
            Err(client_error("connection refused"))
        }
        async fn fetch_pools(&self, _ip: &str) -> Result<Vec<PoolRow>> {
            Err(client_error("connection refused"))
        }
        async fn fetch_events(&self, _filter: &EventFilter) -> Result<Vec<LogEvent>> {
            Err(client_error("connection refused"))
        }
        fn stats(&self) -> ClientStats {
            ClientStats::default()
        }
    }

    fn poller_config() -> PollerConfig {
        PollerConfig {
            interval_secs: 15,
            bin_minutes: 5,
            sample_limit: 500,
            price_feed: false,
        }
    }

    fn farm_config() -> FarmConfig {
        FarmConfig {
            base_url: "http://127.0.0.1:8080".into(),
            ip: None,
            request_timeout_secs: 5,
        }
    }

    fn kinds(events: &[SystemEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn cycle_publishes_every_farm_widget() {
        let (_tx, prefs_rx) = watch::channel(UiPrefs::default());
        let journal = EventJournal::new();
        let mut poller: Poller<_, PublicPriceFeed, _> = Poller::new(
            poller_config(),
            None,
            MockFarmClient::new(farm_config()),
            None,
            LocalBus::new(64),
            journal.clone(),
            prefs_rx,
        );

        poller.poll_cycle().await.expect("cycle");
        let events = journal.snapshot_events().await;
        let kinds = kinds(&events);
        assert_eq!(
            kinds,
            vec![
                EventKind::Summary,
                EventKind::Series,
                EventKind::Miners,
                EventKind::Log
            ]
        );
        // Pools only exist in single-miner mode; price feed is off.
        assert!(!kinds.contains(&EventKind::Pools));
        assert!(!kinds.contains(&EventKind::Price));
    }

    #[tokio::test]
    async fn single_miner_cycle_includes_pools_and_scopes_rows() {
        let (_tx, prefs_rx) = watch::channel(UiPrefs::default());
        let journal = EventJournal::new();
        let mut poller: Poller<_, PublicPriceFeed, _> = Poller::new(
            poller_config(),
            Some("10.0.0.12".into()),
            MockFarmClient::new(farm_config()),
            None,
            LocalBus::new(64),
            journal.clone(),
            prefs_rx,
        );

        poller.poll_cycle().await.expect("cycle");
        let events = journal.snapshot_events().await;
        assert!(kinds(&events).contains(&EventKind::Pools));

        let miners = events
            .iter()
            .find_map(|e| match &e.payload {
                EventPayload::Miners(m) => Some(m.rows.clone()),
                _ => None,
            })
            .expect("miners event");
        assert_eq!(miners.len(), 1);
        assert_eq!(miners[0].ip, "10.0.0.12");
    }

    #[tokio::test]
    async fn failures_degrade_to_placeholders_per_widget() {
        let (_tx, prefs_rx) = watch::channel(UiPrefs::default());
        let journal = EventJournal::new();
        let mut poller: Poller<_, PublicPriceFeed, _> = Poller::new(
            poller_config(),
            None,
            FailingClient,
            None,
            LocalBus::new(64),
            journal.clone(),
            prefs_rx,
        );

        poller.poll_cycle().await.expect("cycle survives failures");
        let events = journal.snapshot_events().await;
        assert_eq!(events.len(), 4);
        for event in &events {
            match &event.payload {
                EventPayload::Summary(s) => assert!(s.summary.is_none()),
                EventPayload::Series(s) => {
                    assert!(s.series.is_empty());
                    assert_eq!(s.sample_count, 0);
                }
                EventPayload::Miners(m) => assert!(m.rows.is_empty()),
                EventPayload::Log(l) => assert!(l.entries.is_empty()),
                other => panic!("unexpected payload: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_flag() {
        let (_prefs_tx, prefs_rx) = watch::channel(UiPrefs::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let journal = EventJournal::new();
        let mut poller: Poller<_, PublicPriceFeed, _> = Poller::new(
            poller_config(),
            None,
            MockFarmClient::new(farm_config()),
            None,
            LocalBus::new(64),
            journal.clone(),
            prefs_rx,
        );

        let handle = tokio::spawn(async move {
            poller.run(shutdown_rx).await.expect("run");
            poller
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).expect("signal shutdown");
        handle.await.expect("join");

        let events = journal.snapshot_events().await;
        let lifecycle_phases: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Lifecycle(l) => Some(l.phase),
                _ => None,
            })
            .collect();
        assert!(lifecycle_phases.contains(&LifecyclePhase::Ready));
        assert_eq!(
            lifecycle_phases.last().copied(),
            Some(LifecyclePhase::Shutdown)
        );
        // The immediate first tick ran at least one full cycle.
        assert!(events.iter().any(|e| e.kind == EventKind::Summary));
    }
}
