use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    bus::{BusMessage, MessageBus, SubscriptionSpec},
    error::BridgeError,
    queues::QueueKind,
    workers::{InboxItem, SubscriptionState, WorkerInputs},
};

/// One subscriber: a task that handles its inbox one message at a time.
///
/// Handler invocations never overlap, and shutdown is only observed between
/// messages, so a handler is never cut off halfway through. A pending shutdown
/// wins over queued messages.
#[async_trait]
pub trait Worker: Send + Sized + 'static {
    const SUBSCRIBER_ID: &'static str;

    fn subscription(queue_kind: QueueKind) -> SubscriptionSpec;

    async fn handle(&mut self, message: Arc<BusMessage>, bus: &dyn MessageBus)
    -> Result<(), BridgeError>;

    async fn run(
        mut self,
        mut inputs: WorkerInputs,
        bus: Arc<dyn MessageBus>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        inputs.state.set(SubscriptionState::Subscribed);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                item = inputs.next() => {
                    inputs.state.set(SubscriptionState::Processing);
                    if let Err(e) = self.handle(Arc::clone(&item.message), bus.as_ref()).await {
                        report_failure(Self::SUBSCRIBER_ID, &item, &e);
                    }
                    inputs.state.set(SubscriptionState::Subscribed);
                }
            }
        }

        inputs.state.set(SubscriptionState::Closed);
        info!(subscriber = Self::SUBSCRIBER_ID, "worker stopped");
    }
}

fn report_failure(subscriber: &'static str, item: &InboxItem, err: &BridgeError) {
    let topic = item.topic;
    let seq = item.message.seq;
    match err {
        BridgeError::Decode(_) => {
            warn!(subscriber, topic, seq, "dropping undecodable message: {}", err)
        }
        BridgeError::Forward(_) => {
            warn!(subscriber, topic, seq, "analytics store rejected record, not retried: {}", err)
        }
        BridgeError::Publish(_) => {
            error!(subscriber, topic, seq, "analysis dropped: {}", err)
        }
        BridgeError::Encode(_) | BridgeError::Connect(_) => {
            error!(subscriber, topic, seq, "handler failed: {}", err)
        }
    }
}
