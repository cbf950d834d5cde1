pub mod bridges;
pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod heuristics;
pub mod metrics;
pub mod queues;
pub mod routes;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod topics;
pub mod workers;

pub use bus::{MemoryBus, MessageBus, RetryPolicy};
#[cfg(feature = "nats")]
pub use bus::NatsBus;
pub use config::{BridgeConfig, BridgeRole};
pub use error::{BridgeError, ConnectError, DecodeError, ForwardError, PublishError, Result};
pub use heuristics::{analyze, summarize};
pub use metrics::{BridgeMetrics, HealthReport, MetricsSnapshot};
pub use runtime::{BridgeHandle, HealthSource, start_bridge};
pub use session::SessionBufferStore;
pub use sink::{AnalyticsSink, HttpSink};
