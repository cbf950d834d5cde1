use std::{fmt, str::FromStr, time::Duration};

use anyhow::{Result, ensure};

use crate::{
    bus::RetryPolicy,
    queues::QueueKind,
    session::{BufferLimits, DEFAULT_MAX_EVENTS_PER_SESSION, DEFAULT_MAX_SESSIONS},
};

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
pub const DEFAULT_ANALYTICS_URL: &str = "http://localhost:3000";
pub const DEFAULT_PROJECT: &str = "demo-project";
pub const DEFAULT_FLUSH_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeRole {
    /// Signal and feedback ingestion: buffers, analyzes, publishes.
    Ingest,
    /// Analysis results to the analytics store.
    Relay,
}

impl BridgeRole {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeRole::Ingest => "ingest",
            BridgeRole::Relay => "relay",
        }
    }
}

impl fmt::Display for BridgeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BridgeRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingest" => Ok(BridgeRole::Ingest),
            "relay" => Ok(BridgeRole::Relay),
            other => anyhow::bail!("unknown bridge role: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub nats_url: String,
    pub analytics_url: String,
    pub bridges: Vec<BridgeRole>,
    pub flush_threshold: usize,
    pub max_events_per_session: usize,
    pub max_sessions: usize,
    pub publish_attempts: u32,
    pub publish_backoff: Duration,
    pub publish_timeout: Duration,
    pub http_timeout: Duration,
    pub connect_timeout: Duration,
    pub inbox_capacity: usize,
    pub default_project: String,
    pub skip_sink_probe: bool,
    pub health_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            analytics_url: DEFAULT_ANALYTICS_URL.to_string(),
            bridges: vec![BridgeRole::Ingest, BridgeRole::Relay],
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_events_per_session: DEFAULT_MAX_EVENTS_PER_SESSION,
            max_sessions: DEFAULT_MAX_SESSIONS,
            publish_attempts: 5,
            publish_backoff: Duration::from_millis(200),
            publish_timeout: Duration::from_millis(2000),
            http_timeout: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(5000),
            inbox_capacity: 1024,
            default_project: DEFAULT_PROJECT.to_string(),
            skip_sink_probe: false,
            health_interval: Duration::from_secs(30),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.flush_threshold >= 1, "flush threshold must be >= 1");
        ensure!(
            self.max_events_per_session >= self.flush_threshold,
            "max events per session ({}) must be >= flush threshold ({})",
            self.max_events_per_session,
            self.flush_threshold
        );
        ensure!(self.max_sessions >= 1, "max sessions must be >= 1");
        ensure!(self.publish_attempts >= 1, "publish attempts must be >= 1");
        ensure!(self.inbox_capacity >= 1, "inbox capacity must be >= 1");
        ensure!(!self.bridges.is_empty(), "at least one bridge role is required");
        ensure!(
            !self.default_project.trim().is_empty(),
            "default project must not be empty"
        );
        Ok(())
    }

    pub fn runs(&self, role: BridgeRole) -> bool {
        self.bridges.contains(&role)
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits {
            max_events_per_session: self.max_events_per_session,
            max_sessions: self.max_sessions,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.publish_attempts,
            base_delay: self.publish_backoff,
            ..RetryPolicy::default()
        }
    }

    /// Ingest inboxes shed the oldest signal under overload.
    pub fn ingest_queue(&self) -> QueueKind {
        QueueKind::FifoDropOldest {
            capacity: self.inbox_capacity,
        }
    }

    /// Relay inboxes are drained by their own task and reject when full.
    pub fn relay_queue(&self) -> QueueKind {
        QueueKind::Isolated {
            inbox: self.inbox_capacity,
            output_buffer: self.inbox_capacity,
        }
    }
}
