//! banchod entrypoint: load config, wire up the shared services, register
//! the default public channels, spawn the periodic workers and the
//! control-plane bridge, then accept connections until a shutdown signal.

use banchod::channel::{Channel, ChannelRegistry};
use banchod::config::AppConfig;
use banchod::kv::memory::MemoryKv;
use banchod::match_engine::MatchRegistry;
use banchod::metrics::PrometheusMetricsSink;
use banchod::network::Gateway;
use banchod::services::Services;
use banchod::session::SessionManager;
use banchod::user_store::InMemoryUserStore;
use banchod::webhook::NoopWebhook;
use banchod::{pubsub_bridge, streams, workers};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the config path from `-c <path>`/`--config <path>`/a bare path,
/// falling back to `banchod.toml` in the current directory when no config
/// file exists there (there is no shipped default deployment config).
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "banchod.toml".to_string(),
    }
}

fn load_config(path: &str) -> AppConfig {
    if Path::new(path).exists() {
        match AppConfig::load(path) {
            Ok(config) => return config,
            Err(err) => {
                eprintln!("ERROR: failed to load config from {path}: {err}");
                std::process::exit(1);
            }
        }
    }
    info!(path, "no config file found, using defaults");
    AppConfig::default()
}

/// Public channels a fresh deployment starts with. A real deployment would
/// load these from the website's database; the demo binary seeds a fixed
/// set so `channelInfo` has something to replay on login.
const DEFAULT_CHANNELS: &[(&str, &str)] = &[
    ("#osu", "Main channel"),
    ("#english", "English speaking channel"),
    ("#announce", "Announcements"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let config = load_config(&config_path);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();

    if let Err(errors) = config.validate() {
        error!(?errors, "configuration validation failed");
        return Err(anyhow::anyhow!("invalid configuration"));
    }

    if config.kv.backend != "memory" {
        tracing::warn!(backend = %config.kv.backend, "no external kv backend wired up yet, falling back to the in-process store");
    }
    let kv = Arc::new(MemoryKv::new());
    let metrics = Arc::new(PrometheusMetricsSink::new());
    let services = Services::new(
        kv,
        Arc::new(banchod::clock::SystemClock),
        Arc::new(InMemoryUserStore::new()),
        metrics,
        Arc::new(NoopWebhook),
        config.locks.clone(),
    );

    let sessions = Arc::new(SessionManager::new());
    let channels = Arc::new(ChannelRegistry::new());
    let matches = Arc::new(MatchRegistry::new());

    streams::StreamRegistry::add(&services, streams::MAIN).await;
    streams::StreamRegistry::add(&services, streams::LOBBY).await;
    for (name, description) in DEFAULT_CHANNELS {
        channels
            .add(&services, Channel { name: name.to_string(), description: description.to_string(), public_read: true, public_write: true, instance: false })
            .await;
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
            shutdown_tx.send(()).ok();
        }
    });

    workers::spawn_spam_decay(services.clone(), sessions.clone(), config.workers.spam_decay_interval_s, shutdown_tx.subscribe());
    workers::spawn_inactivity_reaper(
        services.clone(),
        sessions.clone(),
        channels.clone(),
        matches.clone(),
        config.workers.inactivity_check_interval_s,
        config.workers.inactivity_timeout_s,
        shutdown_tx.subscribe(),
    );
    pubsub_bridge::spawn(services.clone(), sessions.clone(), channels.clone(), matches.clone(), shutdown_tx.subscribe());

    let addr = config.server.bind_address.parse().map_err(|err| anyhow::anyhow!("invalid bind address {}: {err}", config.server.bind_address))?;
    let gateway = Gateway::bind(addr, services, sessions, channels, matches).await?;
    gateway.run(shutdown_tx.subscribe()).await?;
    Ok(())
}
