use std::{pin::Pin, sync::Arc};

use tokio::sync::{Notify, mpsc};

/// Bounded hand-off with its own drain task: the producer side never blocks,
/// and a full inbox rejects the newest item instead of evicting queued ones.
pub struct IsolatedForwarder<T> {
    inbox_tx: mpsc::Sender<T>,
}

pub type DrainTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Drain tasks that must be spawned before the bus starts delivering.
#[derive(Default)]
pub struct StartupTasks {
    pub tokio: Vec<DrainTask>,
}

impl StartupTasks {
    pub fn spawn_all(self) -> Vec<tokio::task::JoinHandle<()>> {
        self.tokio.into_iter().map(tokio::spawn).collect()
    }
}

impl<T: Send + 'static> IsolatedForwarder<T> {
    pub fn new(
        inbox_capacity: usize,
        output_buffer: usize,
        notify_any: Arc<Notify>,
    ) -> (IsolatedForwarder<T>, mpsc::Receiver<T>, DrainTask) {
        let (inbox_tx, mut inbox_rx) = mpsc::channel::<T>(inbox_capacity);
        let (out_tx, out_rx) = mpsc::channel::<T>(output_buffer);

        let drain_task = Box::pin(async move {
            while let Some(value) = inbox_rx.recv().await {
                if out_tx.send(value).await.is_err() {
                    break;
                }
                notify_any.notify_one();
            }
        });

        (IsolatedForwarder { inbox_tx }, out_rx, drain_task)
    }

    pub fn try_send(&self, value: T) -> Result<(), T> {
        self.inbox_tx.try_send(value).map_err(|e| e.into_inner())
    }
}

impl<T> Clone for IsolatedForwarder<T> {
    fn clone(&self) -> Self {
        Self {
            inbox_tx: self.inbox_tx.clone(),
        }
    }
}
