use thiserror::Error;

pub type Result<T, E = HashwatchError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum HashwatchError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("client error: {0}")]
    Client(String),
    #[error("aggregation error: {0}")]
    Aggregate(String),
    #[error("poller error: {0}")]
    Poller(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
