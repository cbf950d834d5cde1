mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use flowback_core::{
    AnalyticsSink, BridgeConfig, BridgeRole, ConnectError, HttpSink, MemoryBus, MessageBus,
    PublishError, start_bridge,
    bus::{InputSpec, SubscriptionBuilder, SubscriptionHandle, SubscriptionSpec},
    queues::QueueKind,
    routes::Route,
    topics,
    workers::{SubscriptionState, WorkerInputs},
};
use serde_json::{Value, json};
use tokio::time::timeout;

use common::{eventually, spawn_responder};

fn ingest_only() -> BridgeConfig {
    BridgeConfig {
        bridges: vec![BridgeRole::Ingest],
        ..BridgeConfig::default()
    }
}

async fn capture(bus: &MemoryBus, topic: &'static str) -> (WorkerInputs, Vec<SubscriptionHandle>) {
    let mut built = SubscriptionBuilder::new()
        .subscribe(SubscriptionSpec {
            subscriber_id: "test.capture",
            inputs: vec![InputSpec {
                topic,
                queue_kind: QueueKind::FifoDropOldest { capacity: 64 },
            }],
        })
        .build(bus)
        .await
        .unwrap();
    let inputs = built.wiring.take("test.capture").unwrap();
    (inputs, built.subscriptions)
}

/// Holds every publish on `topic` for `delay` before handing it to `inner`.
struct SlowPublishBus {
    inner: MemoryBus,
    topic: &'static str,
    delay: Duration,
}

#[async_trait]
impl MessageBus for SlowPublishBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if topic == self.topic {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, route: Route) -> Result<SubscriptionHandle, ConnectError> {
        self.inner.subscribe(route).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

async fn publish_signal(bus: &MemoryBus, session: &str, action: &str, ts: i64) {
    let body = json!({
        "sessionId": session,
        "projectId": "shop",
        "timestamp": ts,
        "type": "signal.raw",
        "payload": {"action": action}
    });
    bus.publish(topics::SIGNAL_RAW, body.to_string().into_bytes())
        .await
        .unwrap();
}

#[tokio::test]
async fn demo_session_yields_one_friction_analysis() {
    let bus = MemoryBus::new();
    let (mut out, _subs) = capture(&bus, topics::ANALYSIS_FRICTION).await;
    let handle = start_bridge(&ingest_only(), Arc::new(bus.clone()), None)
        .await
        .unwrap();

    publish_signal(&bus, "s_demo", "click", 0).await;
    publish_signal(&bus, "s_demo", "click", 200).await;
    publish_signal(&bus, "s_demo", "click", 400).await;
    publish_signal(&bus, "s_demo", "hover", 900).await;
    publish_signal(&bus, "s_demo", "nav", 1500).await;

    let item = timeout(Duration::from_secs(2), out.next()).await.unwrap();
    let record: Value = serde_json::from_slice(&item.message.payload).unwrap();
    assert_eq!(record["sessionId"], "s_demo");
    assert_eq!(record["type"], "friction.analysis");

    let summary = record["analysis"].as_str().unwrap();
    assert!(summary.contains("3 click"), "{}", summary);
    assert!(summary.contains("1 hover"), "{}", summary);
    assert!(summary.contains("1 nav"), "{}", summary);
    assert!(summary.contains("2 rapid click"), "{}", summary);
    assert_eq!(record["metrics"]["rapidClicks"], 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(out.try_next().is_none());
    assert_eq!(handle.store.size(), 0);

    handle.shutdown(&bus).await;
}

#[tokio::test]
async fn fourth_event_does_not_flush() {
    let bus = MemoryBus::new();
    let (mut out, _subs) = capture(&bus, topics::ANALYSIS_FRICTION).await;
    let handle = start_bridge(&ingest_only(), Arc::new(bus.clone()), None)
        .await
        .unwrap();

    for ts in [0, 1000, 2000, 3000] {
        publish_signal(&bus, "s_quiet", "scroll", ts).await;
    }

    assert!(eventually(|| handle.store.buffered("s_quiet") == 4).await);
    assert!(out.try_next().is_none());

    handle.shutdown(&bus).await;
}

#[tokio::test]
async fn malformed_message_does_not_disturb_other_sessions() {
    let bus = MemoryBus::new();
    let (mut out, _subs) = capture(&bus, topics::ANALYSIS_FRICTION).await;
    let handle = start_bridge(&ingest_only(), Arc::new(bus.clone()), None)
        .await
        .unwrap();

    publish_signal(&bus, "s_a", "click", 0).await;
    bus.publish(topics::SIGNAL_RAW, b"\x00not json at all".to_vec())
        .await
        .unwrap();
    publish_signal(&bus, "s_b", "click", 0).await;
    for ts in [100, 200, 300, 400] {
        publish_signal(&bus, "s_a", "scroll", ts).await;
    }

    let item = timeout(Duration::from_secs(2), out.next()).await.unwrap();
    let record: Value = serde_json::from_slice(&item.message.payload).unwrap();
    assert_eq!(record["sessionId"], "s_a");
    assert_eq!(handle.store.buffered("s_b"), 1);

    let snapshot = handle.metrics.snapshot();
    assert_eq!(snapshot.decode_errors, 1);
    assert_eq!(snapshot.signals_received, 6);

    handle.shutdown(&bus).await;
}

#[tokio::test]
async fn relay_keeps_going_after_sink_rejects() {
    let (url, mut requests) = spawn_responder(500).await;
    let bus = MemoryBus::new();
    let sink: Arc<dyn AnalyticsSink> = Arc::new(HttpSink::new(&url, Duration::from_secs(2)).unwrap());
    let config = BridgeConfig {
        bridges: vec![BridgeRole::Relay],
        ..BridgeConfig::default()
    };
    let handle = start_bridge(&config, Arc::new(bus.clone()), Some(sink))
        .await
        .unwrap();

    for session in ["first", "second"] {
        let body = json!({
            "sessionId": session,
            "type": "friction.analysis",
            "analysis": "Session has 5 interactions: 5 click",
            "severity": 7
        });
        bus.publish(topics::ANALYSIS_FRICTION, body.to_string().into_bytes())
            .await
            .unwrap();
    }

    let first = timeout(Duration::from_secs(2), requests.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(2), requests.recv()).await.unwrap().unwrap();
    assert_eq!(first.path, "/api/hotspots");
    assert_eq!(first.body["projectId"], "demo-project");
    assert_eq!(first.body["frictionScore"], 0.7);
    assert_eq!(second.body["evidence"], "Session has 5 interactions: 5 click");

    assert!(eventually(|| handle.metrics.snapshot().forward_failed == 2).await);
    assert_eq!(handle.metrics.snapshot().results_received, 2);

    handle.shutdown(&bus).await;
}

#[tokio::test]
async fn relay_role_without_sink_is_rejected() {
    let bus = MemoryBus::new();
    let config = BridgeConfig::default();
    assert!(start_bridge(&config, Arc::new(bus.clone()), None).await.is_err());
}

#[tokio::test]
async fn shutdown_closes_states_and_bus() {
    let bus = MemoryBus::new();
    let handle = start_bridge(&ingest_only(), Arc::new(bus.clone()), None)
        .await
        .unwrap();
    let states = handle.states.clone();
    assert_eq!(states.len(), 2);

    assert!(
        eventually(|| states
            .iter()
            .all(|s| s.get() == SubscriptionState::Subscribed))
        .await
    );
    publish_signal(&bus, "s_partial", "click", 0).await;

    handle.shutdown(&bus).await;

    assert!(states.iter().all(|s| s.get() == SubscriptionState::Closed));
    assert!(bus.is_closed());
    assert_eq!(bus.route_count(topics::SIGNAL_RAW), 0);
    assert!(bus.publish(topics::SIGNAL_RAW, b"{}".to_vec()).await.is_err());
}

#[tokio::test]
async fn shutdown_waits_for_analysis_being_published() {
    let bus = MemoryBus::new();
    let (mut out, _subs) = capture(&bus, topics::ANALYSIS_FRICTION).await;
    let slow = Arc::new(SlowPublishBus {
        inner: bus.clone(),
        topic: topics::ANALYSIS_FRICTION,
        delay: Duration::from_millis(300),
    });
    let config = BridgeConfig {
        flush_threshold: 1,
        ..ingest_only()
    };
    let handle = start_bridge(&config, Arc::clone(&slow) as Arc<dyn MessageBus>, None)
        .await
        .unwrap();

    publish_signal(&bus, "s_late", "click", 0).await;
    assert!(
        eventually(|| handle
            .states
            .iter()
            .any(|s| s.get() == SubscriptionState::Processing))
        .await
    );
    assert!(out.try_next().is_none());

    let metrics = Arc::clone(&handle.metrics);
    let store = Arc::clone(&handle.store);
    handle.shutdown(slow.as_ref()).await;

    let item = out.try_next().expect("analysis published before shutdown returned");
    let record: Value = serde_json::from_slice(&item.message.payload).unwrap();
    assert_eq!(record["sessionId"], "s_late");
    assert_eq!(metrics.snapshot().analyses_published, 1);
    assert_eq!(store.size(), 0);
    assert!(bus.is_closed());
}

#[tokio::test]
async fn inbox_overflow_is_reported_in_health_line() {
    let bus = MemoryBus::new();
    let config = BridgeConfig {
        inbox_capacity: 1,
        ..ingest_only()
    };
    let handle = start_bridge(&config, Arc::new(bus.clone()), None)
        .await
        .unwrap();

    // nothing yields between these publishes, so the worker cannot drain
    for ts in 0..4 {
        publish_signal(&bus, "s_burst", "scroll", ts).await;
    }

    assert_eq!(handle.inbox_drops(), 3);
    let report = handle.health().report();
    assert_eq!(report.inbox_drops, 3);
    assert!(report.to_string().contains("inbox_drops=3"), "{}", report);

    handle.shutdown(&bus).await;
}
