use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    bus::{BusMessage, InputSpec, MessageBus, SubscriptionSpec},
    codec,
    error::BridgeError,
    metrics::BridgeMetrics,
    queues::QueueKind,
    session::short_id,
    sink::{AnalyticsSink, ForwardedPayload, HotspotPayload, SentimentPayload},
    topics,
    workers::Worker,
};

/// Shared by both relay workers: one POST per record, no retry, no outbox.
struct Relay {
    sink: Arc<dyn AnalyticsSink>,
    default_project: String,
    metrics: Arc<BridgeMetrics>,
}

impl Relay {
    async fn forward(&self, session_id: &str, payload: ForwardedPayload) -> Result<(), BridgeError> {
        match self.sink.forward(&payload).await {
            Ok(()) => {
                BridgeMetrics::incr(&self.metrics.forwarded);
                info!(
                    session = short_id(session_id),
                    endpoint = payload.endpoint(),
                    "forwarded to analytics store"
                );
                Ok(())
            }
            Err(e) => {
                BridgeMetrics::incr(&self.metrics.forward_failed);
                Err(e.into())
            }
        }
    }
}

/// Relays friction analyses to `/api/hotspots`.
pub struct FrictionRelayWorker {
    relay: Relay,
}

impl FrictionRelayWorker {
    pub fn new(
        sink: Arc<dyn AnalyticsSink>,
        default_project: impl Into<String>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            relay: Relay {
                sink,
                default_project: default_project.into(),
                metrics,
            },
        }
    }
}

#[async_trait]
impl Worker for FrictionRelayWorker {
    const SUBSCRIBER_ID: &'static str = "flowback.relay.friction";

    fn subscription(queue_kind: QueueKind) -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![InputSpec {
                topic: topics::ANALYSIS_FRICTION,
                queue_kind,
            }],
        }
    }

    async fn handle(
        &mut self,
        message: Arc<BusMessage>,
        _bus: &dyn MessageBus,
    ) -> Result<(), BridgeError> {
        let result = codec::decode_friction(&message.payload).inspect_err(|_| {
            BridgeMetrics::incr(&self.relay.metrics.decode_errors);
        })?;
        BridgeMetrics::incr(&self.relay.metrics.results_received);

        let payload = HotspotPayload::from_analysis(&result, &self.relay.default_project);
        self.relay
            .forward(&result.session_id, ForwardedPayload::Hotspot(payload))
            .await
    }
}

/// Relays sentiment results to `/api/sentiment`.
pub struct SentimentRelayWorker {
    relay: Relay,
}

impl SentimentRelayWorker {
    pub fn new(
        sink: Arc<dyn AnalyticsSink>,
        default_project: impl Into<String>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            relay: Relay {
                sink,
                default_project: default_project.into(),
                metrics,
            },
        }
    }
}

#[async_trait]
impl Worker for SentimentRelayWorker {
    const SUBSCRIBER_ID: &'static str = "flowback.relay.sentiment";

    fn subscription(queue_kind: QueueKind) -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![InputSpec {
                topic: topics::ANALYSIS_SENTIMENT,
                queue_kind,
            }],
        }
    }

    async fn handle(
        &mut self,
        message: Arc<BusMessage>,
        _bus: &dyn MessageBus,
    ) -> Result<(), BridgeError> {
        let result = codec::decode_sentiment(&message.payload).inspect_err(|_| {
            BridgeMetrics::incr(&self.relay.metrics.decode_errors);
        })?;
        BridgeMetrics::incr(&self.relay.metrics.results_received);

        let payload = SentimentPayload::from_result(&result, &self.relay.default_project);
        self.relay
            .forward(&result.session_id, ForwardedPayload::Sentiment(payload))
            .await
    }
}
