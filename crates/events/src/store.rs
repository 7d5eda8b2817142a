use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::diagnostics;
use crate::event::Event;

/// Append-only in-memory ring of gateway events.
///
/// Capacity bounded; overflow evicts the oldest 10% in one sweep so the hot
/// path does not pop per insert. Reads return events sorted by timestamp,
/// with the record-time sequence number breaking ties.
pub struct EventStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    events: VecDeque<Event>,
    next_seq: u64,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record an event: assign its sequence number, append, evict on
    /// overflow, and mirror to the diagnostics emitter.
    pub fn record(&self, mut event: Event) -> u64 {
        let seq;
        {
            let mut inner = self.inner.lock();
            seq = inner.next_seq;
            inner.next_seq += 1;
            event.seq = seq;

            if inner.events.len() >= self.capacity {
                let evict = (self.capacity / 10).max(1);
                inner.events.drain(..evict);
                tracing::debug!(evicted = evict, capacity = self.capacity, "event ring overflow");
            }
            inner.events.push_back(event.clone());
        }
        diagnostics::emit(&event);
        seq
    }

    pub fn get(&self, id: &str) -> Option<Event> {
        self.inner.lock().events.iter().find(|e| e.id == id).cloned()
    }

    pub fn get_by_run_id(&self, run_id: &str) -> Vec<Event> {
        self.filter(|e| e.run_id.as_deref() == Some(run_id))
    }

    pub fn get_by_session_id(&self, session_id: &str) -> Vec<Event> {
        self.filter(|e| e.session_id.as_deref() == Some(session_id))
    }

    /// Most recent `limit` events of a type, oldest first.
    pub fn get_by_type(&self, kind: &str, limit: usize) -> Vec<Event> {
        let mut out = self.filter(|e| e.kind == kind);
        if out.len() > limit {
            out.drain(..out.len() - limit);
        }
        out
    }

    pub fn get_by_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Event> {
        self.filter(|e| e.ts >= from && e.ts <= to)
    }

    /// Drop events older than the given instant. Returns how many went.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.events.len();
        inner.events.retain(|e| e.ts >= cutoff);
        before - inner.events.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    fn filter(&self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        let inner = self.inner.lock();
        let mut out: Vec<Event> = inner.events.iter().filter(|e| pred(e)).cloned().collect();
        out.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.seq.cmp(&b.seq)));
        out
    }
}
