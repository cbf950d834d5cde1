use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    bridges::{FeedbackWorker, FrictionRelayWorker, SentimentRelayWorker, SignalIngestWorker},
    bus::{MessageBus, SubscriptionBuilder, SubscriptionHandle},
    config::{BridgeConfig, BridgeRole},
    metrics::{BridgeMetrics, HealthReport},
    routes::Route,
    session::SessionBufferStore,
    sink::AnalyticsSink,
    workers::{StateCell, Worker},
};

pub struct BridgeHandle {
    pub store: Arc<SessionBufferStore>,
    pub metrics: Arc<BridgeMetrics>,
    pub states: Vec<StateCell>,
    pub routes: Vec<Route>,
    shutdown_tx: broadcast::Sender<()>,
    subscriptions: Vec<SubscriptionHandle>,
    workers: Vec<JoinHandle<()>>,
    drains: Vec<JoinHandle<()>>,
}

/// Cloneable view of everything the health line reports.
#[derive(Clone)]
pub struct HealthSource {
    store: Arc<SessionBufferStore>,
    metrics: Arc<BridgeMetrics>,
    routes: Vec<Route>,
}

impl HealthSource {
    pub fn report(&self) -> HealthReport {
        let stats = self.store.stats();
        HealthReport {
            counters: self.metrics.snapshot(),
            live_sessions: self.store.size(),
            events_evicted: stats.events_evicted,
            sessions_evicted: stats.sessions_evicted,
            inbox_drops: self.routes.iter().map(Route::drops).sum(),
        }
    }
}

/// Subscribes every configured bridge on `bus` and starts one worker per
/// subscriber. A relay role needs `sink`.
pub async fn start_bridge(
    config: &BridgeConfig,
    bus: Arc<dyn MessageBus>,
    sink: Option<Arc<dyn AnalyticsSink>>,
) -> Result<BridgeHandle> {
    config.validate()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let store = Arc::new(SessionBufferStore::new(config.buffer_limits()));
    let metrics = Arc::new(BridgeMetrics::new());

    let ingest = config.runs(BridgeRole::Ingest);
    let relay_sink = if config.runs(BridgeRole::Relay) {
        Some(sink.context("relay bridge requires an analytics sink")?)
    } else {
        None
    };

    let mut builder = SubscriptionBuilder::new();
    if ingest {
        builder = builder
            .subscribe(SignalIngestWorker::subscription(config.ingest_queue()))
            .subscribe(FeedbackWorker::subscription(config.ingest_queue()));
    }
    if relay_sink.is_some() {
        builder = builder
            .subscribe(FrictionRelayWorker::subscription(config.relay_queue()))
            .subscribe(SentimentRelayWorker::subscription(config.relay_queue()));
    }

    let built = builder.build(bus.as_ref()).await?;
    let mut wiring = built.wiring;
    debug!(subscriptions = built.subscriptions.len(), "bus wiring ready");

    // isolated inboxes must drain before the first delivery lands
    let drains = built.tasks.spawn_all();

    let mut workers = Vec::new();
    if ingest {
        let signal_worker = SignalIngestWorker::new(
            Arc::clone(&store),
            config.flush_threshold,
            config.retry_policy(),
            Arc::clone(&metrics),
        );
        workers.push(tokio::spawn(signal_worker.run(
            wiring.take(SignalIngestWorker::SUBSCRIBER_ID)?,
            Arc::clone(&bus),
            shutdown_rx.resubscribe(),
        )));

        let feedback_worker = FeedbackWorker::new(Arc::clone(&metrics));
        workers.push(tokio::spawn(feedback_worker.run(
            wiring.take(FeedbackWorker::SUBSCRIBER_ID)?,
            Arc::clone(&bus),
            shutdown_rx.resubscribe(),
        )));
    }
    if let Some(sink) = relay_sink {
        let friction_worker = FrictionRelayWorker::new(
            Arc::clone(&sink),
            config.default_project.clone(),
            Arc::clone(&metrics),
        );
        workers.push(tokio::spawn(friction_worker.run(
            wiring.take(FrictionRelayWorker::SUBSCRIBER_ID)?,
            Arc::clone(&bus),
            shutdown_rx.resubscribe(),
        )));

        let sentiment_worker = SentimentRelayWorker::new(
            sink,
            config.default_project.clone(),
            Arc::clone(&metrics),
        );
        workers.push(tokio::spawn(sentiment_worker.run(
            wiring.take(SentimentRelayWorker::SUBSCRIBER_ID)?,
            Arc::clone(&bus),
            shutdown_rx.resubscribe(),
        )));
    }

    let roles: Vec<&str> = config.bridges.iter().map(BridgeRole::name).collect();
    info!(roles = ?roles, workers = workers.len(), "bridge started");

    Ok(BridgeHandle {
        store,
        metrics,
        states: built.states,
        routes: built.routes,
        shutdown_tx,
        subscriptions: built.subscriptions,
        workers,
        drains,
    })
}

impl BridgeHandle {
    pub fn health(&self) -> HealthSource {
        HealthSource {
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            routes: self.routes.clone(),
        }
    }

    pub fn log_health(&self) {
        self.health().report().log();
    }

    /// Inbox overflow drops summed over every route.
    pub fn inbox_drops(&self) -> u64 {
        self.health().report().inbox_drops
    }

    /// Unsubscribes everything, lets in-flight handlers finish, then closes
    /// the bus.
    pub async fn shutdown(self, bus: &dyn MessageBus) {
        info!("shutting down bridge");

        for subscription in self.subscriptions {
            subscription.unsubscribe().await;
        }

        // no receivers left means every worker already stopped
        let _ = self.shutdown_tx.send(());
        for worker in self.workers {
            let _ = worker.await;
        }

        for drain in self.drains {
            drain.abort();
        }

        bus.close().await;
        info!(buffered_sessions = self.store.size(), "bridge stopped");
    }
}
