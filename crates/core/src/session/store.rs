use std::{
    collections::{HashMap, VecDeque, hash_map::Entry},
    hash::{DefaultHasher, Hash, Hasher},
    sync::{
        Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use crate::events::InteractionEvent;

pub const DEFAULT_SHARDS: usize = 16;
pub const DEFAULT_MAX_EVENTS_PER_SESSION: usize = 1000;
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// Oldest events are dropped once a buffer holds this many.
    pub max_events_per_session: usize,
    /// Least-recently-appended session is evicted once this many are live.
    pub max_sessions: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_events_per_session: DEFAULT_MAX_EVENTS_PER_SESSION,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub events_evicted: u64,
    pub sessions_evicted: u64,
}

struct SessionBuffer {
    events: VecDeque<InteractionEvent>,
    last_append: u64,
}

#[derive(Default)]
struct Shard {
    buffers: HashMap<String, SessionBuffer>,
}

/// Pending events per session, sharded by session id.
///
/// Appends and drains lock exactly one shard and never suspend, so operations
/// on one session are linearizable. The session cap is global: `live` counts
/// every buffer plus slots reserved by in-flight inserts, and a new session
/// only gets a slot once the least-recently-appended buffer across all shards
/// has been evicted. Eviction scans shards one lock at a time.
pub struct SessionBufferStore {
    shards: Box<[Mutex<Shard>]>,
    limits: BufferLimits,
    live: AtomicUsize,
    append_seq: AtomicU64,
    events_evicted: AtomicU64,
    sessions_evicted: AtomicU64,
}

impl SessionBufferStore {
    pub fn new(limits: BufferLimits) -> Self {
        Self::with_shards(limits, DEFAULT_SHARDS)
    }

    pub fn with_shards(limits: BufferLimits, shards: usize) -> Self {
        assert!(shards > 0);
        assert!(limits.max_events_per_session > 0);
        assert!(limits.max_sessions > 0);

        Self {
            shards: (0..shards).map(|_| Mutex::new(Shard::default())).collect(),
            limits,
            live: AtomicUsize::new(0),
            append_seq: AtomicU64::new(0),
            events_evicted: AtomicU64::new(0),
            sessions_evicted: AtomicU64::new(0),
        }
    }

    /// Appends `event` to the session's buffer, creating it if needed, and
    /// returns the buffer's new length.
    pub fn append(&self, session_id: &str, event: InteractionEvent) -> usize {
        let seq = self.append_seq.fetch_add(1, Ordering::Relaxed);
        let slot = self.shard(session_id);

        {
            let mut shard = slot.lock().expect("SessionBufferStore poisoned");
            if let Some(buffer) = shard.buffers.get_mut(session_id) {
                return self.push(buffer, event, seq);
            }
        }

        // no shard lock is held while a slot is reserved
        self.reserve_slot();

        let mut shard = slot.lock().expect("SessionBufferStore poisoned");
        let buffer = match shard.buffers.entry(session_id.to_string()) {
            Entry::Occupied(existing) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                existing.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(SessionBuffer {
                events: VecDeque::new(),
                last_append: seq,
            }),
        };
        self.push(buffer, event, seq)
    }

    /// Removes and returns the whole buffer, in arrival order, if it holds at
    /// least `threshold` events. Otherwise returns an empty vec and leaves the
    /// buffer untouched.
    pub fn drain_if_threshold(&self, session_id: &str, threshold: usize) -> Vec<InteractionEvent> {
        let mut shard = self.shard(session_id).lock().expect("SessionBufferStore poisoned");

        let ready = shard
            .buffers
            .get(session_id)
            .is_some_and(|b| b.events.len() >= threshold);
        if !ready {
            return Vec::new();
        }

        match shard.buffers.remove(session_id) {
            Some(buffer) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                buffer.events.into()
            }
            None => Vec::new(),
        }
    }

    /// Number of sessions with buffered events.
    pub fn size(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("SessionBufferStore poisoned").buffers.len())
            .sum()
    }

    pub fn buffered(&self, session_id: &str) -> usize {
        self.shard(session_id)
            .lock()
            .expect("SessionBufferStore poisoned")
            .buffers
            .get(session_id)
            .map_or(0, |b| b.events.len())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
        }
    }

    fn shard(&self, session_id: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        &self.shards[(hasher.finish() % self.shards.len() as u64) as usize]
    }

    fn push(&self, buffer: &mut SessionBuffer, event: InteractionEvent, seq: u64) -> usize {
        if buffer.events.len() >= self.limits.max_events_per_session {
            let _ = buffer.events.pop_front();
            self.events_evicted.fetch_add(1, Ordering::Relaxed);
        }
        buffer.events.push_back(event);
        buffer.last_append = buffer.last_append.max(seq);
        buffer.events.len()
    }

    fn reserve_slot(&self) {
        loop {
            let live = self.live.load(Ordering::Acquire);
            if live < self.limits.max_sessions {
                if self
                    .live
                    .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return;
                }
                continue;
            }

            // every slot may be reserved by inserts that have not landed yet
            if !self.evict_least_recent() {
                std::thread::yield_now();
            }
        }
    }

    fn evict_least_recent(&self) -> bool {
        let victim = self
            .shards
            .iter()
            .enumerate()
            .filter_map(|(idx, shard)| {
                let shard = shard.lock().expect("SessionBufferStore poisoned");
                shard
                    .buffers
                    .iter()
                    .min_by_key(|(_, b)| b.last_append)
                    .map(|(id, b)| (b.last_append, idx, id.clone()))
            })
            .min_by_key(|(last_append, _, _)| *last_append);

        let Some((last_append, idx, id)) = victim else {
            return false;
        };

        let mut shard = self.shards[idx].lock().expect("SessionBufferStore poisoned");
        // appended to or drained since the scan
        if shard
            .buffers
            .get(&id)
            .is_none_or(|b| b.last_append != last_append)
        {
            return false;
        }

        let Some(evicted) = shard.buffers.remove(&id) else {
            return false;
        };
        drop(shard);

        self.live.fetch_sub(1, Ordering::AcqRel);
        self.sessions_evicted.fetch_add(1, Ordering::Relaxed);
        self.events_evicted
            .fetch_add(evicted.events.len() as u64, Ordering::Relaxed);
        tracing::warn!(
            session = %short_id(&id),
            dropped_events = evicted.events.len(),
            "session buffer evicted, store at capacity"
        );
        true
    }
}

impl Default for SessionBufferStore {
    fn default() -> Self {
        Self::new(BufferLimits::default())
    }
}

/// First 8 characters of a session id, for log lines.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
