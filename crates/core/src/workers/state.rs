use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    Disconnected = 0,
    Connecting = 1,
    Subscribed = 2,
    Processing = 3,
    Closed = 4,
}

impl SubscriptionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SubscriptionState::Connecting,
            2 => SubscriptionState::Subscribed,
            3 => SubscriptionState::Processing,
            4 => SubscriptionState::Closed,
            _ => SubscriptionState::Disconnected,
        }
    }
}

/// Lifecycle of one subscriber, readable from outside its worker task.
#[derive(Clone)]
pub struct StateCell {
    subscriber_id: &'static str,
    state: Arc<AtomicU8>,
}

impl StateCell {
    pub fn new(subscriber_id: &'static str) -> Self {
        Self {
            subscriber_id,
            state: Arc::new(AtomicU8::new(SubscriptionState::Disconnected as u8)),
        }
    }

    pub fn get(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Closed is terminal; later transitions are ignored.
    pub fn set(&self, next: SubscriptionState) {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != SubscriptionState::Closed as u8).then_some(next as u8)
            });
        if let Ok(prev) = prev {
            let prev = SubscriptionState::from_u8(prev);
            if prev != next {
                tracing::trace!(subscriber = self.subscriber_id, ?prev, ?next, "state");
            }
        }
    }
}
