use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{
    bus::{BusMessage, MessageBus, SubscriptionHandle},
    error::{ConnectError, PublishError},
    routes::Route,
};

/// In-process topic router. Publishing fans a message out to every route
/// subscribed to the topic without blocking; publishes with no subscriber are
/// counted and discarded, as on a real broker.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

#[derive(Default)]
struct MemoryBusInner {
    routes: RwLock<HashMap<&'static str, Vec<(u64, Route)>>>,
    next_route_id: AtomicU64,
    next_seq: AtomicU64,
    unrouted_publish_total: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unrouted_publish_total(&self) -> u64 {
        self.inner.unrouted_publish_total.load(Ordering::Relaxed)
    }

    pub fn route_count(&self, topic: &str) -> usize {
        self.inner
            .routes
            .read()
            .expect("MemoryBus routes poisoned")
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl MemoryBusInner {
    fn remove_route(&self, topic: &'static str, id: u64) {
        let mut routes = self.routes.write().expect("MemoryBus routes poisoned");
        if let Some(list) = routes.get_mut(topic) {
            list.retain(|(route_id, _)| *route_id != id);
            if list.is_empty() {
                routes.remove(topic);
            }
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let message = Arc::new(BusMessage::new(topic, payload, seq));

        let routes = self.inner.routes.read().expect("MemoryBus routes poisoned");
        let Some(routes) = routes.get(topic) else {
            self.inner
                .unrouted_publish_total
                .fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        for (_, route) in routes {
            route.deliver(Arc::clone(&message));
        }
        Ok(())
    }

    async fn subscribe(&self, route: Route) -> Result<SubscriptionHandle, ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::Subscribe {
                topic: route.topic.to_string(),
                reason: "bus closed".to_string(),
            });
        }

        let id = self.inner.next_route_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .routes
            .write()
            .expect("MemoryBus routes poisoned")
            .entry(route.topic)
            .or_default()
            .push((id, route.clone()));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let topic = route.topic;
        let task = tokio::spawn(async move {
            // resolves on unsubscribe and on handle drop alike
            let _ = stop_rx.await;
            inner.remove_route(topic, id);
        });

        Ok(SubscriptionHandle::new(&route, stop_tx, task))
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner
            .routes
            .write()
            .expect("MemoryBus routes poisoned")
            .clear();
    }
}
