//! PAIRWATCH: new-pair token risk tracker
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the token database and runs the discovery feed, the rescan scheduler and
//! the optional status API until Ctrl+C, then drains the pipeline.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pairwatch::config::{self, AppConfig};
use pairwatch::credentials::CredentialRotator;
use pairwatch::discovery::PairCreatedPoller;
use pairwatch::engine::feed::run_discovery;
use pairwatch::engine::pipeline::ClassificationPipeline;
use pairwatch::engine::scheduler::RescanScheduler;
use pairwatch::providers::honeypot::HoneypotClient;
use pairwatch::providers::security::SecurityClient;
use pairwatch::rpc::RpcClient;
use pairwatch::status::{self, StatusState};
use pairwatch::storage::TokenStore;
use pairwatch::tracker::CallTracker;

const BANNER: &str = r#"
 ___  _   ___ _____      ___ _____ ___ _  _
| _ \/_\ |_ _| _ \ \    / /_\_   _/ __| || |
|  _/ _ \ | ||   /\ \/\/ / _ \| || (__| __ |
|_|/_/ \_\___|_|_\ \_/\_/_/ \_\_| \___|_||_|

  New-pair token risk tracker
  v0.1.0
"#;

/// Upper bound on waiting for background tasks after the pipeline drains.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::default_path();
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        rescan_interval_secs = cfg.scanner.rescan_interval_secs,
        max_rescan_count = cfg.scanner.max_rescan_count,
        failure_limit = cfg.scanner.honeypot_failure_limit,
        "PAIRWATCH starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = TokenStore::open(&cfg.storage).await?;
    let tracker = Arc::new(CallTracker::new());

    let honeypot = Arc::new(HoneypotClient::new(&cfg.providers.honeypot, tracker.clone())?);
    let security = Arc::new(SecurityClient::new(&cfg.providers.security, tracker.clone())?);

    let pipeline = Arc::new(ClassificationPipeline::from_config(
        &cfg,
        honeypot,
        security,
        store.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let scheduler = RescanScheduler::new(pipeline.clone(), store.clone(), &cfg.scanner);
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move { scheduler.run(rx).await }));

    if cfg.status.enabled {
        let state = Arc::new(StatusState::new(tracker.clone(), store.clone()));
        let port = cfg.status.port;
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = status::serve(state, port, rx).await {
                error!(error = %e, "Status API failed");
            }
        }));
    }

    if cfg.rpc.enabled {
        match start_discovery(&cfg, pipeline.clone(), shutdown_rx.clone()) {
            Ok(handle) => tasks.push(handle),
            Err(e) => warn!(error = %e, "Pair discovery disabled; rescans only"),
        }
    } else {
        info!("Pair discovery disabled by config; rescans only");
    }

    // -- Run until Ctrl+C -------------------------------------------------

    info!("Running. Press Ctrl+C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    pipeline.shutdown().await;

    for task in tasks {
        match tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Background task panicked"),
            Err(_) => warn!("Background task did not stop in time"),
        }
    }

    match store.stats().await {
        Ok(stats) => info!(
            active = stats.active,
            honeypots = stats.honeypots,
            removed = stats.removed,
            avg_scans = %format!("{:.1}", stats.avg_scans),
            "Final store summary"
        ),
        Err(e) => error!(error = %e, "Failed to read final store summary"),
    }
    tracker.log_summary();
    store.close().await;

    info!("PAIRWATCH shut down cleanly.");
    Ok(())
}

/// Build the RPC stack and spawn the discovery feed.
fn start_discovery(
    cfg: &AppConfig,
    pipeline: Arc<ClassificationPipeline>,
    shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let rotator = Arc::new(CredentialRotator::from_config(&cfg.rpc)?);
    let rpc = Arc::new(RpcClient::new(rotator)?);
    let mut poller = PairCreatedPoller::new(rpc, &cfg.rpc);

    let poll_interval = Duration::from_secs(cfg.rpc.poll_interval_secs);
    let pair_delay = Duration::from_secs(cfg.scanner.discovery_token_delay_secs);

    Ok(tokio::spawn(async move {
        run_discovery(&mut poller, pipeline, poll_interval, pair_delay, shutdown).await;
    }))
}

/// Set up tracing-subscriber with env-filter and optional JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pairwatch=info"));

    let json_logging = std::env::var("PAIRWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
