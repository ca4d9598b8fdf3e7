use std::{env, path::Path, sync::mpsc};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use hashwatch_client::{FarmApi, HttpFarmClient, MockFarmClient, PublicPriceFeed};
use hashwatch_network::{DashboardBus, LocalBus};
use hashwatch_ops::{ensure_state_dir, init_tracing, init_tracing_to_file, EventJournal, PrefsStore};
use hashwatch_poller::{PollRunner, Poller};
use hashwatch_types::config::HashwatchConfig;
use tokio::sync::watch;
use tracing::error;

mod ui;

#[derive(Debug, Parser)]
#[command(name = "hashwatch", about = "Terminal dashboard for a mining-farm monitoring API")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<String>,
    /// Monitor a single miner by address instead of the whole farm.
    #[arg(long)]
    ip: Option<String>,
    /// Override the farm API base URL.
    #[arg(long)]
    base_url: Option<String>,
    /// Override the poll interval in seconds.
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Use the built-in mock client instead of the network.
    #[arg(long)]
    mock: bool,
    /// Poll and log without the terminal UI.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref());
    if let Some(ip) = &args.ip {
        config.farm.ip = Some(ip.clone());
    }
    if let Some(base_url) = &args.base_url {
        config.farm.base_url = base_url.clone();
    }
    if let Some(interval) = args.interval_secs {
        config.poller.interval_secs = interval;
    }
    if let Err(err) = config.validate() {
        eprintln!("Invalid configuration after overrides: {err}. Falling back to defaults.");
        config = HashwatchConfig::default();
    }

    let state_dir = ensure_state_dir(&config.ops.state_dir)?;
    if args.headless {
        init_tracing(&config.ops)?;
    } else {
        init_tracing_to_file(&config.ops, &state_dir)?;
    }

    let price = if config.poller.price_feed && !args.mock {
        Some(PublicPriceFeed::new(config.farm.request_timeout_secs)?)
    } else {
        None
    };

    if args.mock {
        let client = MockFarmClient::new(config.farm.clone());
        run_app(client, price, config, args.headless).await
    } else {
        let client = HttpFarmClient::new(&config.farm)?;
        run_app(client, price, config, args.headless).await
    }
}

async fn run_app<C>(
    client: C,
    price: Option<PublicPriceFeed>,
    config: HashwatchConfig,
    headless: bool,
) -> Result<()>
where
    C: FarmApi + Send + Sync + 'static,
{
    let store = PrefsStore::new(Path::new(&config.ops.state_dir));
    let initial_prefs = store.load();
    let (prefs_tx, prefs_rx) = watch::channel(initial_prefs);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bus = LocalBus::new(256);
    let journal = EventJournal::new();
    let mut poller = Poller::new(
        config.poller.clone(),
        config.farm.ip.clone(),
        client,
        price,
        bus.clone(),
        journal,
        prefs_rx,
    );
    poller.boot(&config).await?;

    // Subscribe before the first cycle so no event is missed.
    let mut stream = bus.subscribe();
    let poller_handle = tokio::spawn(async move {
        if let Err(err) = poller.run(shutdown_rx).await {
            error!("poller stopped with error: {err}");
        }
    });

    if headless {
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(true);
        poller_handle.await?;
        return Ok(());
    }

    let (ui_tx, ui_rx) = mpsc::channel();
    let bridge = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if ui_tx.send(ui::UiMessage::Event(event)).is_err() {
                return;
            }
        }
        let _ = ui_tx.send(ui::UiMessage::Shutdown);
    });

    let context = ui::UiContext {
        prefs_tx,
        store,
        prefs: initial_prefs,
        focused_ip: config.farm.ip.clone(),
        poll_interval_secs: config.poller.interval_secs,
    };
    let ui_handle = tokio::task::spawn_blocking(move || ui::run(ui_rx, context));
    let ui_result = ui_handle.await?;

    let _ = shutdown_tx.send(true);
    poller_handle.await?;
    bridge.abort();
    ui_result
}

fn load_config(arg_path: Option<&str>) -> HashwatchConfig {
    let from_env = env::var("HASHWATCH_CONFIG").ok();
    let path = arg_path
        .map(str::to_string)
        .or(from_env)
        .unwrap_or_else(|| "configs/dev.toml".into());
    match HashwatchConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                HashwatchConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            HashwatchConfig::default()
        }
    }
}
