use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use flowback_core::{
    AnalyticsSink, BridgeConfig, BridgeRole, HealthSource, HttpSink, MessageBus, NatsBus,
    start_bridge,
};
use tokio::{sync::broadcast, task::JoinHandle, time::interval};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// CLI wrapper for BridgeRole (needed for clap ValueEnum)
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliRole {
    Ingest,
    Relay,
}

impl From<CliRole> for BridgeRole {
    fn from(cli: CliRole) -> Self {
        match cli {
            CliRole::Ingest => BridgeRole::Ingest,
            CliRole::Relay => BridgeRole::Relay,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "flowback-bridge")]
#[command(about = "Buffers interaction signals per session, publishes friction analyses and relays results to the analytics store")]
#[command(version)]
struct Cli {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    nats_url: String,

    /// Analytics store base URL
    #[arg(long, env = "ANALYTICS_STORE_URL", default_value = "http://localhost:3000")]
    analytics_url: String,

    /// Bridges to run
    #[arg(
        long,
        env = "FLOWBACK_BRIDGES",
        value_enum,
        value_delimiter = ',',
        default_value = "ingest,relay"
    )]
    bridges: Vec<CliRole>,

    /// Buffered events per session that trigger an analysis
    #[arg(long, env = "FLOWBACK_FLUSH_THRESHOLD", default_value_t = 5)]
    flush_threshold: usize,

    /// Oldest events are dropped beyond this many per session
    #[arg(long, env = "FLOWBACK_MAX_EVENTS_PER_SESSION", default_value_t = 1000)]
    max_events_per_session: usize,

    /// Least recently active session is evicted beyond this many
    #[arg(long, env = "FLOWBACK_MAX_SESSIONS", default_value_t = 10_000)]
    max_sessions: usize,

    #[arg(long, env = "FLOWBACK_PUBLISH_ATTEMPTS", default_value_t = 5)]
    publish_attempts: u32,

    #[arg(long, env = "FLOWBACK_PUBLISH_BACKOFF_MS", default_value_t = 200)]
    publish_backoff_ms: u64,

    #[arg(long, env = "FLOWBACK_PUBLISH_TIMEOUT_MS", default_value_t = 2000)]
    publish_timeout_ms: u64,

    #[arg(long, env = "FLOWBACK_HTTP_TIMEOUT_MS", default_value_t = 5000)]
    http_timeout_ms: u64,

    #[arg(long, env = "FLOWBACK_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Per-topic inbox capacity
    #[arg(long, env = "FLOWBACK_INBOX_CAPACITY", default_value_t = 1024)]
    inbox_capacity: usize,

    /// Project id used when a result carries none
    #[arg(long, env = "FLOWBACK_DEFAULT_PROJECT", default_value = "demo-project")]
    default_project: String,

    /// Start the relay without checking the analytics store first
    #[arg(long, env = "FLOWBACK_SKIP_SINK_PROBE")]
    skip_sink_probe: bool,

    /// Seconds between health log lines
    #[arg(long, env = "FLOWBACK_HEALTH_INTERVAL_SECS", default_value_t = 30)]
    health_interval_secs: u64,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "FLOWBACK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl From<&Cli> for BridgeConfig {
    fn from(cli: &Cli) -> Self {
        let mut bridges: Vec<BridgeRole> = Vec::new();
        for role in cli.bridges.iter().copied().map(BridgeRole::from) {
            if !bridges.contains(&role) {
                bridges.push(role);
            }
        }

        BridgeConfig {
            nats_url: cli.nats_url.clone(),
            analytics_url: cli.analytics_url.clone(),
            bridges,
            flush_threshold: cli.flush_threshold,
            max_events_per_session: cli.max_events_per_session,
            max_sessions: cli.max_sessions,
            publish_attempts: cli.publish_attempts,
            publish_backoff: Duration::from_millis(cli.publish_backoff_ms),
            publish_timeout: Duration::from_millis(cli.publish_timeout_ms),
            http_timeout: Duration::from_millis(cli.http_timeout_ms),
            connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
            inbox_capacity: cli.inbox_capacity,
            default_project: cli.default_project.clone(),
            skip_sink_probe: cli.skip_sink_probe,
            health_interval: Duration::from_secs(cli.health_interval_secs.max(1)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();

    info!("flowback-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = BridgeConfig::from(&cli);
    config.validate()?;

    let bus: Arc<dyn MessageBus> = Arc::new(
        NatsBus::connect(&config.nats_url, config.connect_timeout, config.publish_timeout).await?,
    );

    let sink: Option<Arc<dyn AnalyticsSink>> = if config.runs(BridgeRole::Relay) {
        let http = HttpSink::new(&config.analytics_url, config.http_timeout)?;
        if config.skip_sink_probe {
            info!("Skipping analytics store probe");
        } else {
            http.probe().await?;
            info!("Analytics store reachable at {}", http.base_url());
        }
        Some(Arc::new(http))
    } else {
        None
    };

    let handle = start_bridge(&config, Arc::clone(&bus), sink).await?;

    let (health_tx, _) = broadcast::channel::<()>(1);
    let health_handle = spawn_health_task(
        handle.health(),
        config.health_interval,
        health_tx.subscribe(),
    );

    info!("All bridges running. Press Ctrl+C to stop.");
    wait_for_shutdown().await?;

    let _ = health_tx.send(());
    if let Err(e) = health_handle.await {
        error!("Health task failed: {}", e);
    }

    handle.log_health();
    handle.shutdown(bus.as_ref()).await;

    Ok(())
}

fn spawn_health_task(
    health: HealthSource,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => health.report().log(),
            }
        }
    })
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
