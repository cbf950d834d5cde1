use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::info;

/// Process-wide counters. Every drop path bumps one of these so lost records
/// show up in the health log rather than disappearing silently.
#[derive(Default)]
pub struct BridgeMetrics {
    pub signals_received: AtomicU64,
    pub feedback_received: AtomicU64,
    pub decode_errors: AtomicU64,
    pub analyses_published: AtomicU64,
    pub publish_retries: AtomicU64,
    pub publish_dropped: AtomicU64,
    pub results_received: AtomicU64,
    pub forwarded: AtomicU64,
    pub forward_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub signals_received: u64,
    pub feedback_received: u64,
    pub decode_errors: u64,
    pub analyses_published: u64,
    pub publish_retries: u64,
    pub publish_dropped: u64,
    pub results_received: u64,
    pub forwarded: u64,
    pub forward_failed: u64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            signals_received: self.signals_received.load(Ordering::Relaxed),
            feedback_received: self.feedback_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            analyses_published: self.analyses_published.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
            publish_dropped: self.publish_dropped.load(Ordering::Relaxed),
            results_received: self.results_received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            forward_failed: self.forward_failed.load(Ordering::Relaxed),
        }
    }
}

/// One health line: counters plus store and inbox gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub counters: MetricsSnapshot,
    pub live_sessions: usize,
    pub events_evicted: u64,
    pub sessions_evicted: u64,
    pub inbox_drops: u64,
}

impl HealthReport {
    pub fn log(&self) {
        info!("{}", self);
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        write!(
            f,
            "Health: signals={} feedback={} decode_errors={} published={} publish_retries={} \
             publish_dropped={} results={} forwarded={} forward_failed={} live_sessions={} \
             events_evicted={} sessions_evicted={} inbox_drops={}",
            c.signals_received,
            c.feedback_received,
            c.decode_errors,
            c.analyses_published,
            c.publish_retries,
            c.publish_dropped,
            c.results_received,
            c.forwarded,
            c.forward_failed,
            self.live_sessions,
            self.events_evicted,
            self.sessions_evicted,
            self.inbox_drops,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_line_names_every_drop_path() {
        let metrics = BridgeMetrics::new();
        BridgeMetrics::incr(&metrics.decode_errors);
        BridgeMetrics::incr(&metrics.publish_dropped);

        let line = HealthReport {
            counters: metrics.snapshot(),
            live_sessions: 3,
            events_evicted: 4,
            sessions_evicted: 1,
            inbox_drops: 7,
        }
        .to_string();

        assert!(line.starts_with("Health: "), "{}", line);
        for part in [
            "decode_errors=1",
            "publish_dropped=1",
            "live_sessions=3",
            "events_evicted=4",
            "sessions_evicted=1",
            "inbox_drops=7",
        ] {
            assert!(line.contains(part), "{} missing from {}", part, line);
        }
    }
}
