//! 'main' for the Aether Net monitor server process

use aether_common::configuration::{
    count_from_config, optional_string_from_config, poll_interval_from_config,
    rate_windows_from_config, string_from_config, SourceMode, CONFIG_KEY_HTTP_ADDRESS,
    CONFIG_KEY_LOCAL_CAPACITY, CONFIG_KEY_LOCAL_REPLAY_FILE, CONFIG_KEY_NETWORK_ADDRESS,
    CONFIG_KEY_NETWORK_MAX_LINE_BYTES,
};
use aether_common::{AggregateListener, CounterSnapshotListener};
use aether_module_rate_monitor::WindowedRateMonitor;
use aether_module_snapshot_poller::{
    LocalSource, ModeSource, NetworkSource, PollBridge, SnapshotSource, DEFAULT_MAX_LINE_BYTES,
};
use aether_module_stream_view::ViewBuilder;
use aether_module_topology_store::TopologyStore;
use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

mod server;

use server::AppState;

const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_NETWORK_ADDRESS: &str = "0.0.0.0:40123";
const DEFAULT_LOCAL_CAPACITY: usize = 1024;

#[derive(Debug, Parser)]
#[command(name = "aether-net")]
#[command(about = "Serves the live publisher/subscriber view of a messaging system")]
struct Args {
    /// Configuration files, later ones override earlier ones
    #[arg(short, long = "config", default_value = "aether-net.toml")]
    config: Vec<PathBuf>,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    // Standard logging using RUST_LOG for log levels, default to INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default().with(fmt::layer().with_filter(filter)).init();

    info!("Aether Net monitor server");

    let args = Args::parse();
    let mut builder = Config::builder();
    for path in &args.config {
        builder = builder.add_source(File::from(path.as_path()).required(false));
    }
    let config = builder
        .add_source(Environment::with_prefix("AETHER"))
        .build()
        .context("Failed to read configuration")?;

    let mode = SourceMode::from_config(&config);
    let period = poll_interval_from_config(&config)?;
    let windows = rate_windows_from_config(&config)?;
    info!(
        "Source mode {mode}, polling every {}ms, rate windows {}",
        period.as_millis(),
        windows.iter().map(|w| w.label()).collect::<Vec<_>>().join(", ")
    );

    let store = Arc::new(TopologyStore::new());
    let rates = Arc::new(WindowedRateMonitor::new(windows.clone()));
    let listeners: Vec<Arc<dyn CounterSnapshotListener>> = vec![store.clone(), rates.clone()];
    let fan_out = Arc::new(AggregateListener::new(listeners));

    let source = open_source(&config, mode).await?;
    info!("Snapshot source ({}): {}", source.mode(), source.description());
    let poller = PollBridge::new(source, fan_out, period).spawn();

    let http_address = string_from_config(&config, CONFIG_KEY_HTTP_ADDRESS, DEFAULT_HTTP_ADDRESS)?;
    let listener = TcpListener::bind(&http_address)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {http_address}"))?;

    let state = AppState {
        store,
        rates,
        builder: Arc::new(ViewBuilder::new(windows)),
    };
    server::serve(listener, state, shutdown_signal()).await?;

    poller.abort();
    info!("Exiting");
    Ok(())
}

/// Open the snapshot source for the configured mode
async fn open_source(config: &Config, mode: SourceMode) -> Result<ModeSource> {
    let capacity = count_from_config(config, CONFIG_KEY_LOCAL_CAPACITY, DEFAULT_LOCAL_CAPACITY)?;

    match mode {
        SourceMode::Local => {
            let (publisher, source) = LocalSource::create(capacity);
            match optional_string_from_config(config, CONFIG_KEY_LOCAL_REPLAY_FILE)? {
                Some(path) => {
                    tokio::spawn(async move {
                        match publisher.replay_file(Path::new(&path)).await {
                            Ok(count) => info!("Replayed {count} snapshots from {path}"),
                            Err(e) => error!("Replay failed: {e}"),
                        }
                    });
                }
                None => info!("No replay file configured, local source starts empty"),
            }
            Ok(source.into())
        }
        SourceMode::Network => {
            let address =
                string_from_config(config, CONFIG_KEY_NETWORK_ADDRESS, DEFAULT_NETWORK_ADDRESS)?;
            let max_line_bytes = count_from_config(
                config,
                CONFIG_KEY_NETWORK_MAX_LINE_BYTES,
                DEFAULT_MAX_LINE_BYTES,
            )?;
            Ok(NetworkSource::bind(&address, capacity, max_line_bytes).await?.into())
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl-c, shutting down"),
        Err(e) => error!("Failed to listen for ctrl-c: {e}"),
    }
}
