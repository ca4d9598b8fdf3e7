//! In-process fan-out of dashboard events to renderers and recorders.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use hashwatch_types::{events::SystemEvent, Result};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[async_trait]
pub trait DashboardBus: Send + Sync {
    async fn publish(&self, event: SystemEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, SystemEvent>;
}

/// Broadcast-channel bus. Publishing never blocks on subscribers; a slow
/// subscriber loses the oldest events, which for a dashboard means it
/// simply catches up to the latest state.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl DashboardBus for LocalBus {
    async fn publish(&self, event: SystemEvent) -> Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}
