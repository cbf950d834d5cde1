pub mod fifo_drop_oldest_queue;
pub mod isolated_forwarder;

pub use fifo_drop_oldest_queue::*;
pub use isolated_forwarder::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    FifoDropOldest { capacity: usize },
    Isolated { inbox: usize, output_buffer: usize },
}
