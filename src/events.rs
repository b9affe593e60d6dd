use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Handle identifying a single listener registration.
///
/// Returned by [`EventBus::on`] and used to remove that registration
/// with [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Generic named-event registry: subscribe, unsubscribe, emit.
///
/// `K` is the event key (e.g. a topic enum), `P` the payload handed to
/// callbacks. Listeners for the same key are independent and invoked
/// synchronously in registration order. A listener that panics is caught
/// and logged; it never prevents the remaining listeners from running and
/// never reaches the emitter.
pub struct EventBus<K, P> {
    listeners: Mutex<HashMap<K, Vec<(ListenerId, Callback<P>)>>>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash + Clone, P> EventBus<K, P> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a callback for `key`.
    ///
    /// Multiple registrations for the same key are all invoked on emit.
    pub fn on(&self, key: K, callback: impl Fn(&P) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove one registration. Returns `false` if it was not present.
    pub fn off(&self, key: &K, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(key);
        }
        removed
    }

    /// Invoke every listener registered for `key`, in registration order.
    ///
    /// Runs against a snapshot of the listener list, so callbacks may
    /// subscribe or unsubscribe without deadlocking.
    pub fn emit(&self, key: &K, payload: &P) {
        let snapshot: Vec<Callback<P>> = {
            let listeners = self.listeners.lock();
            listeners
                .get(key)
                .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                error!("event listener panicked, continuing with remaining listeners");
            }
        }
    }

    /// Number of listeners currently registered for `key`
    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners
            .lock()
            .get(key)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl<K: Eq + Hash + Clone, P> Default for EventBus<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_listeners_invoked_in_registration_order() {
        let bus: EventBus<&'static str, u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.on("tick", move |value| seen.lock().push((tag, *value)));
        }

        bus.emit(&"tick", &7);

        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn test_off_removes_single_registration() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let count = Arc::new(Mutex::new(0u32));

        let keep = {
            let count = count.clone();
            bus.on("evt", move |_| *count.lock() += 1)
        };
        let drop_me = {
            let count = count.clone();
            bus.on("evt", move |_| *count.lock() += 10)
        };

        assert!(bus.off(&"evt", drop_me));
        assert!(!bus.off(&"evt", drop_me)); // already gone
        bus.emit(&"evt", &());

        assert_eq!(*count.lock(), 1);
        assert!(bus.off(&"evt", keep));
        assert_eq!(bus.listener_count(&"evt"), 0);
    }

    #[test]
    fn test_off_unknown_key_is_noop() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let id = bus.on("a", |_| {});
        assert!(!bus.off(&"b", id));
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.on("evt", |_| panic!("listener blew up"));
        {
            let reached = reached.clone();
            bus.on("evt", move |_| *reached.lock() = true);
        }

        // Must not propagate the panic to the emitter either.
        bus.emit(&"evt", &());

        assert!(*reached.lock());
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let bus: Arc<EventBus<&'static str, ()>> = Arc::new(EventBus::new());
        let id_slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let bus_ref = bus.clone();
        let slot_ref = id_slot.clone();
        let id = bus.on("evt", move |_| {
            if let Some(id) = slot_ref.lock().take() {
                bus_ref.off(&"evt", id);
            }
        });
        *id_slot.lock() = Some(id);

        bus.emit(&"evt", &());
        assert_eq!(bus.listener_count(&"evt"), 0);
    }
}
