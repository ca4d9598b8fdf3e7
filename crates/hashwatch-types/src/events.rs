use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::{FarmSummary, LogEvent, MinerStatusRow, PoolRow};
use crate::series::{BtcTicker, FarmSeries, PricePoint};

/// High-level event bus message kinds moving through the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Summary,
    Series,
    Miners,
    Pools,
    Log,
    Price,
    Ops,
}

/// Immutable event envelope for logging, fan-out, and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Summary(SummaryEvent),
    Series(SeriesEvent),
    Miners(MinersEvent),
    Pools(PoolsEvent),
    Log(LogBatchEvent),
    Price(PriceEvent),
    Ops(OpsEvent),
    Unknown(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    Ready,
    Shutdown,
}

/// Summary card refresh. `summary: None` means the fetch failed and the
/// cards should show placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub summary: Option<FarmSummary>,
    /// Set in single-miner mode; the farm-wide summary leaves it empty.
    pub focused_ip: Option<String>,
}

/// Chart refresh: the full replacement series. An empty series clears
/// the charts rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesEvent {
    pub series: FarmSeries,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinersEvent {
    pub rows: Vec<MinerStatusRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolsEvent {
    pub ip: String,
    pub pools: Vec<PoolRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatchEvent {
    pub entries: Vec<LogEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEvent {
    pub ticker: Option<BtcTicker>,
    pub history: Vec<PricePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
    pub message: String,
    pub tags: Vec<String>,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }
}
