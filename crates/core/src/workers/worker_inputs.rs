use std::sync::Arc;

use tokio::sync::{Notify, mpsc};

use crate::{bus::BusMessage, queues::FifoDropOldestReceiver, workers::StateCell};

pub enum FifoReceiver {
    FifoDropOldest(FifoDropOldestReceiver<Arc<BusMessage>>),
    Isolated(mpsc::Receiver<Arc<BusMessage>>),
}

pub struct FifoInput {
    pub topic: &'static str,
    pub receiver: FifoReceiver,
}

/// Everything one worker reads from. All inboxes share `notify_any`, so a
/// single wait covers every subscribed topic.
pub struct WorkerInputs {
    pub fifos: Vec<FifoInput>,
    pub notify_any: Arc<Notify>,
    pub fifo_index: usize,
    pub state: StateCell,
}

pub struct InboxItem {
    pub topic: &'static str,
    pub message: Arc<BusMessage>,
}

impl WorkerInputs {
    /// Next queued message, visiting inboxes round-robin so one busy topic
    /// cannot starve the others.
    pub async fn next(&mut self) -> InboxItem {
        loop {
            if let Some(item) = self.try_next() {
                return item;
            }
            self.notify_any.notified().await;
        }
    }

    pub fn try_next(&mut self) -> Option<InboxItem> {
        if self.fifos.is_empty() {
            return None;
        }

        let start = self.fifo_index;
        loop {
            let i = self.fifo_index;
            self.fifo_index = (self.fifo_index + 1) % self.fifos.len();
            let fifo = &mut self.fifos[i];

            let item = match fifo.receiver {
                FifoReceiver::FifoDropOldest(ref mut r) => r.pop(),
                FifoReceiver::Isolated(ref mut r) => r.try_recv().ok(),
            };

            if let Some(message) = item {
                return Some(InboxItem {
                    topic: fifo.topic,
                    message,
                });
            }

            if self.fifo_index == start {
                return None;
            }
        }
    }
}
