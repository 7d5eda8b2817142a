//! Process-wide diagnostics emitter.
//!
//! Events originate from many components, so the emitter is intentionally
//! global: a single on/off flag plus a list of listener callbacks. Tests
//! swap listeners in and out; listener panics are swallowed per-listener so
//! one bad observer cannot take down the stream reader that emitted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::event::Event;

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

struct Emitter {
    enabled: AtomicBool,
    listeners: RwLock<Vec<(u64, Listener)>>,
    next_id: RwLock<u64>,
}

fn emitter() -> &'static Emitter {
    static EMITTER: OnceLock<Emitter> = OnceLock::new();
    EMITTER.get_or_init(|| Emitter {
        enabled: AtomicBool::new(false),
        listeners: RwLock::new(Vec::new()),
        next_id: RwLock::new(0),
    })
}

/// Turn the emitter on or off.
pub fn set_enabled(enabled: bool) {
    emitter().enabled.store(enabled, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    emitter().enabled.load(Ordering::SeqCst)
}

/// Register a listener. Returns a handle usable with [`remove_listener`].
pub fn add_listener(listener: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
    let em = emitter();
    let mut id_guard = em.next_id.write();
    let id = *id_guard;
    *id_guard += 1;
    em.listeners.write().push((id, Box::new(listener)));
    id
}

pub fn remove_listener(id: u64) {
    emitter().listeners.write().retain(|(lid, _)| *lid != id);
}

/// Remove every listener (test teardown).
pub fn clear_listeners() {
    emitter().listeners.write().clear();
}

/// Deliver an event to all listeners if the emitter is enabled.
///
/// Listeners run under the read lock; a callback must not add or remove
/// listeners.
pub fn emit(event: &Event) {
    let em = emitter();
    if !em.enabled.load(Ordering::SeqCst) {
        return;
    }
    let listeners = em.listeners.read();
    for (id, listener) in listeners.iter() {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            tracing::warn!(listener = id, kind = %event.kind, "diagnostics listener panicked");
        }
    }
}
