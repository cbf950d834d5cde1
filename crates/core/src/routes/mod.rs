use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    bus::BusMessage,
    queues::{FifoDropOldestQueue, IsolatedForwarder},
};

/// Where one subscriber receives one topic.
#[derive(Clone)]
pub struct Route {
    pub subscriber_id: &'static str,
    pub topic: &'static str,
    pub inbox: RouteInbox,
    pub drops_total: Arc<AtomicU64>,
}

#[derive(Clone)]
pub enum RouteInbox {
    FifoDropOldest(Arc<FifoDropOldestQueue<Arc<BusMessage>>>),
    Isolated(IsolatedForwarder<Arc<BusMessage>>),
}

impl RouteInbox {
    /// Returns false when a message was lost to make room or was rejected.
    pub fn try_deliver(&self, message: Arc<BusMessage>) -> bool {
        match self {
            RouteInbox::FifoDropOldest(q) => q.push(message).is_none(),
            RouteInbox::Isolated(fwd) => fwd.try_send(message).is_ok(),
        }
    }
}

impl Route {
    pub fn deliver(&self, message: Arc<BusMessage>) {
        if !self.inbox.try_deliver(message) {
            let dropped = self.drops_total.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                subscriber = self.subscriber_id,
                topic = self.topic,
                dropped_total = dropped,
                "inbox full, message dropped"
            );
        }
    }

    pub fn drops(&self) -> u64 {
        self.drops_total.load(Ordering::Relaxed)
    }
}
