use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    bus::{BusMessage, InputSpec, MessageBus, RetryPolicy, SubscriptionSpec, publish_with_retry},
    codec,
    error::BridgeError,
    events::{AnalysisResult, InteractionEvent, UNKNOWN},
    heuristics,
    metrics::BridgeMetrics,
    queues::QueueKind,
    session::{SessionBufferStore, short_id},
    topics,
    workers::Worker,
};

/// Buffers raw signals per session and publishes a friction analysis each
/// time a session reaches the flush threshold.
pub struct SignalIngestWorker {
    store: Arc<SessionBufferStore>,
    flush_threshold: usize,
    retry: RetryPolicy,
    metrics: Arc<BridgeMetrics>,
}

impl SignalIngestWorker {
    pub fn new(
        store: Arc<SessionBufferStore>,
        flush_threshold: usize,
        retry: RetryPolicy,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            store,
            flush_threshold,
            retry,
            metrics,
        }
    }

    fn build_result(session_id: &str, batch: &[InteractionEvent]) -> AnalysisResult {
        let project_id = batch
            .iter()
            .map(|e| e.project_id.as_str())
            .find(|p| *p != UNKNOWN)
            .unwrap_or(UNKNOWN);

        let report = heuristics::analyze(batch);
        AnalysisResult::friction(
            session_id,
            project_id,
            Utc::now(),
            report.summary,
            report.metrics,
            report.page,
        )
    }
}

#[async_trait]
impl Worker for SignalIngestWorker {
    const SUBSCRIBER_ID: &'static str = "flowback.ingest.signal";

    fn subscription(queue_kind: QueueKind) -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![InputSpec {
                topic: topics::SIGNAL_RAW,
                queue_kind,
            }],
        }
    }

    async fn handle(
        &mut self,
        message: Arc<BusMessage>,
        bus: &dyn MessageBus,
    ) -> Result<(), BridgeError> {
        let event = codec::decode_signal(&message.payload).inspect_err(|_| {
            BridgeMetrics::incr(&self.metrics.decode_errors);
        })?;
        BridgeMetrics::incr(&self.metrics.signals_received);

        let session_id = event.session_id.clone();
        let buffered = self.store.append(&session_id, event);
        debug!(
            session = short_id(&session_id),
            buffered, "signal buffered"
        );

        // append and drain both complete before the next await point
        let batch = self.store.drain_if_threshold(&session_id, self.flush_threshold);
        if batch.is_empty() {
            return Ok(());
        }

        let result = Self::build_result(&session_id, &batch);
        info!(
            session = short_id(&session_id),
            events = batch.len(),
            "{}",
            result.summary
        );

        let payload = codec::encode(&result)?;
        match publish_with_retry(
            bus,
            topics::ANALYSIS_FRICTION,
            &payload,
            &self.retry,
            &self.metrics,
        )
        .await
        {
            Ok(attempts) => {
                BridgeMetrics::incr(&self.metrics.analyses_published);
                debug!(
                    session = short_id(&session_id),
                    attempts, "friction analysis published"
                );
                Ok(())
            }
            Err(e) => {
                BridgeMetrics::incr(&self.metrics.publish_dropped);
                Err(e.into())
            }
        }
    }
}

/// Logs user feedback. Nothing is buffered or forwarded.
pub struct FeedbackWorker {
    metrics: Arc<BridgeMetrics>,
}

impl FeedbackWorker {
    pub fn new(metrics: Arc<BridgeMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Worker for FeedbackWorker {
    const SUBSCRIBER_ID: &'static str = "flowback.ingest.feedback";

    fn subscription(queue_kind: QueueKind) -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![InputSpec {
                topic: topics::FEEDBACK_RECORDED,
                queue_kind,
            }],
        }
    }

    async fn handle(
        &mut self,
        message: Arc<BusMessage>,
        _bus: &dyn MessageBus,
    ) -> Result<(), BridgeError> {
        let feedback = codec::decode_feedback(&message.payload).inspect_err(|_| {
            BridgeMetrics::incr(&self.metrics.decode_errors);
        })?;
        BridgeMetrics::incr(&self.metrics.feedback_received);

        info!(
            session = short_id(&feedback.session_id),
            project = %feedback.project_id,
            reaction = %feedback.reaction,
            page = feedback.page.as_deref().unwrap_or("-"),
            "feedback: {}",
            feedback.comment
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        bus::{MemoryBus, SubscriptionBuilder, SubscriptionHandle},
        session::BufferLimits,
        workers::WorkerInputs,
    };

    fn worker(threshold: usize) -> (SignalIngestWorker, Arc<SessionBufferStore>, Arc<BridgeMetrics>) {
        let store = Arc::new(SessionBufferStore::new(BufferLimits::default()));
        let metrics = Arc::new(BridgeMetrics::new());
        let w = SignalIngestWorker::new(
            Arc::clone(&store),
            threshold,
            RetryPolicy::default(),
            Arc::clone(&metrics),
        );
        (w, store, metrics)
    }

    /// Inputs plus the handles keeping the route alive.
    async fn capture(bus: &MemoryBus, topic: &'static str) -> (WorkerInputs, Vec<SubscriptionHandle>) {
        let mut built = SubscriptionBuilder::new()
            .subscribe(SubscriptionSpec {
                subscriber_id: "test.capture",
                inputs: vec![InputSpec {
                    topic,
                    queue_kind: QueueKind::FifoDropOldest { capacity: 16 },
                }],
            })
            .build(bus)
            .await
            .unwrap();
        let inputs = built.wiring.take("test.capture").unwrap();
        (inputs, built.subscriptions)
    }

    fn signal(session: &str, action: &str, ts: i64) -> Arc<BusMessage> {
        let raw = json!({
            "sessionId": session,
            "projectId": "shop",
            "timestamp": ts,
            "type": "signal.raw",
            "payload": {"action": action}
        });
        Arc::new(BusMessage::new(topics::SIGNAL_RAW, raw.to_string().into_bytes(), 0))
    }

    #[tokio::test]
    async fn publishes_once_threshold_is_reached() {
        let bus = MemoryBus::new();
        let (mut out, _subs) = capture(&bus, topics::ANALYSIS_FRICTION).await;
        let (mut w, store, metrics) = worker(3);

        w.handle(signal("s1", "click", 0), &bus).await.unwrap();
        w.handle(signal("s1", "click", 100), &bus).await.unwrap();
        assert!(out.try_next().is_none());
        assert_eq!(store.buffered("s1"), 2);

        w.handle(signal("s1", "nav", 900), &bus).await.unwrap();
        let item = out.try_next().expect("analysis published");
        assert!(out.try_next().is_none());
        assert_eq!(store.size(), 0);

        let record: Value = serde_json::from_slice(&item.message.payload).unwrap();
        assert_eq!(record["sessionId"], "s1");
        assert_eq!(record["projectId"], "shop");
        assert_eq!(record["type"], "friction.analysis");
        let summary = record["analysis"].as_str().unwrap();
        assert!(summary.contains("2 click"));
        assert!(summary.contains("1 nav"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.signals_received, 3);
        assert_eq!(snapshot.analyses_published, 1);
    }

    #[tokio::test]
    async fn undecodable_signal_is_counted_and_skipped() {
        let bus = MemoryBus::new();
        let (mut w, store, metrics) = worker(5);

        let junk = Arc::new(BusMessage::new(topics::SIGNAL_RAW, b"{not json".to_vec(), 0));
        let err = w.handle(junk, &bus).await.unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));

        w.handle(signal("s2", "click", 0), &bus).await.unwrap();
        assert_eq!(store.buffered("s2"), 1);
        assert_eq!(metrics.snapshot().decode_errors, 1);
    }

    #[tokio::test]
    async fn closed_bus_drops_the_analysis_visibly() {
        let bus = MemoryBus::new();
        bus.close().await;
        let (mut w, _store, metrics) = worker(1);

        let err = w.handle(signal("s3", "click", 0), &bus).await.unwrap_err();
        assert!(matches!(err, BridgeError::Publish(_)));
        assert_eq!(metrics.snapshot().publish_dropped, 1);
    }

    #[tokio::test]
    async fn feedback_is_counted_not_buffered() {
        let bus = MemoryBus::new();
        let metrics = Arc::new(BridgeMetrics::new());
        let mut w = FeedbackWorker::new(Arc::clone(&metrics));

        let raw = json!({
            "sessionId": "s4",
            "payload": {"reaction": "frustrated", "comment": "can't find checkout"}
        });
        let msg = Arc::new(BusMessage::new(
            topics::FEEDBACK_RECORDED,
            raw.to_string().into_bytes(),
            0,
        ));
        w.handle(msg, &bus).await.unwrap();

        assert_eq!(metrics.snapshot().feedback_received, 1);
        assert_eq!(bus.unrouted_publish_total(), 0);
    }
}
