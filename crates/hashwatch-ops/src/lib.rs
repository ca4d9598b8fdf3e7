//! Operational helpers: logging, preference persistence, event history.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use hashwatch_types::{
    config::OpsConfig, events::SystemEvent, prefs::UiPrefs, HashwatchError, Result,
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    fmt()
        .with_env_filter(log_filter(config)?)
        .try_init()
        .map_err(|err| HashwatchError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Log to a file under the state dir instead of stdout; the terminal UI
/// owns the screen while it runs.
pub fn init_tracing_to_file(config: &OpsConfig, state_dir: &Path) -> Result<()> {
    let path = state_dir.join("hashwatch.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| HashwatchError::Ops(format!("failed to open log file {path:?}: {err}")))?;
    fmt()
        .with_env_filter(log_filter(config)?)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| HashwatchError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

fn log_filter(config: &OpsConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| HashwatchError::Ops(format!("failed to create log filter: {err}")))
}

pub fn ensure_state_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| HashwatchError::Ops(format!("failed to create state dir: {err}")))?;
    info!("State directory ready at {:?}", dir);
    Ok(dir)
}

/// On-disk persistence for the dashboard toggles.
///
/// Loading never fails: a missing or corrupt file yields defaults.
pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("prefs.toml"),
        }
    }

    pub fn load(&self) -> UiPrefs {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
                debug!("ignoring corrupt prefs file {:?}: {err}", self.path);
                UiPrefs::default()
            }),
            Err(_) => UiPrefs::default(),
        }
    }

    pub fn save(&self, prefs: &UiPrefs) -> Result<()> {
        let doc = toml::to_string(prefs)
            .map_err(|err| HashwatchError::Ops(format!("failed to encode prefs: {err}")))?;
        std::fs::write(&self.path, doc)
            .map_err(|err| HashwatchError::Ops(format!("failed to write prefs: {err}")))
    }
}

const JOURNAL_CAP: usize = 512;

/// Bounded in-memory record of published events; the dashboard only ever
/// re-reads recent history.
#[derive(Clone, Default)]
pub struct EventJournal {
    events: Arc<Mutex<VecDeque<SystemEvent>>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: SystemEvent) {
        let mut events = self.events.lock().await;
        if events.len() == JOURNAL_CAP {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub async fn snapshot_events(&self) -> Vec<SystemEvent> {
        self.events.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashwatch_types::events::{EventKind, EventPayload, OpsEvent};
    use hashwatch_types::prefs::Theme;

    #[test]
    fn prefs_roundtrip_through_state_dir() {
        let dir = std::env::temp_dir().join("hashwatch-prefs-test");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let store = PrefsStore::new(&dir);

        let mut prefs = UiPrefs::default();
        prefs.active_only = false;
        prefs.chart_hours = 6;
        prefs.theme = Theme::Light;
        store.save(&prefs).expect("save prefs");

        let loaded = store.load();
        assert_eq!(loaded, prefs);
        std::fs::remove_dir_all(&dir).expect("cleanup temp dir");
    }

    #[test]
    fn missing_or_corrupt_prefs_load_defaults() {
        let dir = std::env::temp_dir().join("hashwatch-prefs-corrupt-test");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let store = PrefsStore::new(&dir);
        assert_eq!(store.load(), UiPrefs::default());

        std::fs::write(dir.join("prefs.toml"), "not [valid toml").expect("write corrupt file");
        assert_eq!(store.load(), UiPrefs::default());
        std::fs::remove_dir_all(&dir).expect("cleanup temp dir");
    }

    #[tokio::test]
    async fn journal_drops_oldest_past_cap() {
        let journal = EventJournal::new();
        for i in 0..(JOURNAL_CAP + 10) {
            journal
                .record_event(SystemEvent::new(
                    EventKind::Ops,
                    EventPayload::Ops(OpsEvent {
                        message: format!("event {i}"),
                        tags: Vec::new(),
                    }),
                ))
                .await;
        }
        let snapshot = journal.snapshot_events().await;
        assert_eq!(snapshot.len(), JOURNAL_CAP);
        match &snapshot[0].payload {
            EventPayload::Ops(ops) => assert_eq!(ops.message, "event 10"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
