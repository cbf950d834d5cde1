use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::{
    bus::{BusMessage, MessageBus, SubscriptionHandle},
    error::{ConnectError, PublishError},
    routes::Route,
};

/// NATS core pub/sub. Each subscription gets a pump task that moves messages
/// from the NATS subscriber into the route's inbox.
pub struct NatsBus {
    client: async_nats::Client,
    url: String,
    publish_timeout: Duration,
    next_seq: Arc<AtomicU64>,
}

impl NatsBus {
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        publish_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let client = tokio::time::timeout(connect_timeout, async_nats::connect(url))
            .await
            .map_err(|_| ConnectError::Timeout {
                url: url.to_string(),
                after: connect_timeout,
            })?
            .map_err(|e| ConnectError::Bus {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        info!("Connected to NATS at {}", url);

        Ok(Self {
            client,
            url: url.to_string(),
            publish_timeout,
            next_seq: Arc::new(AtomicU64::new(0)),
        })
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let send = async {
            self.client
                .publish(topic.to_string(), Bytes::from(payload))
                .await
                .map_err(|e| PublishError::Transport {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            self.client
                .flush()
                .await
                .map_err(|e| PublishError::Transport {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
        };

        tokio::time::timeout(self.publish_timeout, send)
            .await
            .map_err(|_| PublishError::Timeout {
                topic: topic.to_string(),
                after: self.publish_timeout,
            })?
    }

    async fn subscribe(&self, route: Route) -> Result<SubscriptionHandle, ConnectError> {
        let mut subscriber = self
            .client
            .subscribe(route.topic.to_string())
            .await
            .map_err(|e| ConnectError::Subscribe {
                topic: route.topic.to_string(),
                reason: e.to_string(),
            })?;

        info!("Subscribed to {}", route.topic);

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let seq = Arc::clone(&self.next_seq);
        let pump_route = route.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        if let Err(e) = subscriber.unsubscribe().await {
                            warn!(topic = pump_route.topic, "NATS unsubscribe failed: {}", e);
                        }
                        break;
                    }
                    next = subscriber.next() => match next {
                        Some(message) => {
                            let message = BusMessage::new(
                                message.subject.to_string(),
                                message.payload.to_vec(),
                                seq.fetch_add(1, Ordering::Relaxed),
                            );
                            pump_route.deliver(Arc::new(message));
                        }
                        None => {
                            warn!(topic = pump_route.topic, "NATS subscription stream ended");
                            break;
                        }
                    },
                }
            }
        });

        Ok(SubscriptionHandle::new(&route, stop_tx, task))
    }

    async fn close(&self) {
        if let Err(e) = self.client.flush().await {
            warn!("NATS flush on close failed: {}", e);
        }
        // the socket itself goes away with the last client clone
        info!("Flushed NATS connection to {}", self.url);
    }
}
