//! Message bus seam. The bridges only ever see [`MessageBus`]; NATS and the
//! in-process router are interchangeable behind it.

pub mod bus_builder;
pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;
pub mod retry;

pub use bus_builder::*;
pub use memory::*;
#[cfg(feature = "nats")]
pub use nats::*;
pub use retry::*;

use async_trait::async_trait;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    error::{ConnectError, PublishError},
    routes::Route,
};

/// One delivery from the bus, shared by every route it fans out to.
#[derive(Debug)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub seq: u64,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, seq: u64) -> Self {
        Self {
            topic: topic.into(),
            payload,
            seq,
        }
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Starts delivering `route.topic` into `route.inbox` until the returned
    /// handle is unsubscribed or dropped.
    async fn subscribe(&self, route: Route) -> Result<SubscriptionHandle, ConnectError>;

    /// Flushes pending publishes. Whether later traffic is refused is up to
    /// the implementation.
    async fn close(&self);
}

pub struct SubscriptionHandle {
    topic: &'static str,
    subscriber_id: &'static str,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn new(
        route: &Route,
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            topic: route.topic,
            subscriber_id: route.subscriber_id,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Stops delivery and waits until nothing more reaches the inbox.
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!(
            subscriber = self.subscriber_id,
            topic = self.topic,
            "unsubscribed"
        );
    }
}
