use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::Notify;

/// Producer side of a bounded inbox. A push into a full inbox discards the
/// entry that has waited longest and hands it back to the caller.
pub struct FifoDropOldestQueue<T> {
    shared: Arc<Slots<T>>,
}

/// Consumer side; only ever polled by the owning worker.
pub struct FifoDropOldestReceiver<T> {
    shared: Arc<Slots<T>>,
}

struct Slots<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
    wake: Arc<Notify>,
}

impl<T> Slots<T> {
    fn entries(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.entries.lock().expect("inbox poisoned")
    }
}

impl<T> FifoDropOldestQueue<T> {
    /// `wake` is shared by every inbox of one worker.
    pub fn new(capacity: usize, wake: Arc<Notify>) -> Self {
        assert!(capacity > 0, "inbox capacity must be positive");

        let shared = Slots {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            wake,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn push(&self, entry: T) -> Option<T> {
        let displaced = {
            let mut entries = self.shared.entries();
            let displaced = if entries.len() == self.shared.capacity {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(entry);
            displaced
        };
        self.shared.wake.notify_one();
        displaced
    }

    pub fn receiver(&self) -> FifoDropOldestReceiver<T> {
        FifoDropOldestReceiver {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> FifoDropOldestReceiver<T> {
    pub fn pop(&self) -> Option<T> {
        self.shared.entries().pop_front()
    }
}
