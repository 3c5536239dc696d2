// ── Event dispatch bus ──
//
// Synchronous, insertion-ordered delivery of domain events, with an
// atomic batch mode for multi-event operations that must not be
// observed partially. A name-keyed handler surface is kept for older
// consumers; it shares the bus value but never touches the batch queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use super::Event;

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;
type NamedHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handle returned by [`EventBus::add_listener`]; pass it back to
/// [`EventBus::remove_listener`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// Handle returned by [`EventBus::on`] for the name-keyed surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedHandle(u64);

/// Ordered delivery of [`Event`]s to registered listeners.
///
/// Cheaply cloneable; clones share the same listener list and queue.
/// Delivery is synchronous: outside batch mode, `emit` invokes every
/// listener in registration order before returning. Listeners
/// registered while a delivery is in flight have no ordering guarantee
/// for events already being dispatched.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Vec<(u64, Listener)>>,
    named: Mutex<HashMap<String, Vec<(u64, NamedHandler)>>>,
    next_id: AtomicU64,
    batching: AtomicBool,
    queue: Mutex<VecDeque<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Typed listener surface ───────────────────────────────────────

    /// Register a listener. Listeners are invoked in registration order.
    pub fn add_listener(&self, listener: impl Fn(&Event) + Send + Sync + 'static) -> ListenerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        ListenerHandle(id)
    }

    /// Remove a listener. Removing a handle that was never added (or
    /// was already removed) is a no-op.
    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.inner.listeners.lock().retain(|(id, _)| *id != handle.0);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Publish an event.
    ///
    /// Outside batch mode every current listener is invoked before this
    /// returns; in batch mode the event is appended to the queue and
    /// delivered when the batch ends.
    pub fn emit(&self, event: Event) {
        if self.inner.batching.load(Ordering::Acquire) {
            self.inner.queue.lock().push_back(event);
        } else {
            self.deliver(&event);
        }
    }

    /// Open a batch handle. The batch is inert until `start()`.
    pub fn batch(&self) -> Batch {
        Batch { bus: self.clone() }
    }

    /// Invoke every listener with `event`, in registration order.
    ///
    /// The listener list is snapshotted before the first call, so a
    /// listener mutating the list mid-delivery affects later emissions
    /// only.
    fn deliver(&self, event: &Event) {
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    // ── Name-keyed surface ───────────────────────────────────────────

    /// Register a handler for a string-named event with positional
    /// arguments. Multiple handlers per name are supported.
    pub fn on(&self, name: &str, handler: impl Fn(&[Value]) + Send + Sync + 'static) -> NamedHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .named
            .lock()
            .entry(name.to_owned())
            .or_default()
            .push((id, Arc::new(handler)));
        NamedHandle(id)
    }

    /// Remove a name-keyed handler; absent handles are a no-op.
    pub fn off(&self, name: &str, handle: NamedHandle) {
        let mut named = self.inner.named.lock();
        if let Some(handlers) = named.get_mut(name) {
            handlers.retain(|(id, _)| *id != handle.0);
            if handlers.is_empty() {
                named.remove(name);
            }
        }
    }

    /// Invoke every handler registered under `name`, immediately.
    ///
    /// This path never interacts with the batch queue.
    pub fn emit_named(&self, name: &str, args: &[Value]) {
        let snapshot: Vec<NamedHandler> = {
            let named = self.inner.named.lock();
            match named.get(name) {
                Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(args);
        }
    }
}

/// Batch handle for atomic multi-event emission.
///
/// Between `start()` and `end()`, events routed through the bus are
/// queued instead of delivered; `end()` flushes the queue FIFO so
/// listeners observe the whole group back to back.
pub struct Batch {
    bus: EventBus,
}

impl Batch {
    /// Enter batch mode, discarding any stale queued events.
    pub fn start(&self) {
        self.bus.inner.queue.lock().clear();
        self.bus.inner.batching.store(true, Ordering::Release);
    }

    /// Queue an event for delivery at `end()`. If the batch was never
    /// started (or already ended) this degrades to an immediate emit.
    pub fn queue(&self, event: Event) {
        self.bus.emit(event);
    }

    /// Leave batch mode and flush the queue, FIFO, to every listener.
    pub fn end(&self) {
        self.bus.inner.batching.store(false, Ordering::Release);
        let drained: Vec<Event> = {
            let mut queue = self.bus.inner.queue.lock();
            queue.drain(..).collect()
        };
        for event in drained {
            self.bus.deliver(&event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus) -> (ListenerHandle, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = bus.add_listener(move |event| sink.lock().push(event.name().to_owned()));
        (handle, seen)
    }

    fn property_event(property: &str) -> Event {
        Event::DevicePropertyChanged {
            device_id: "cam-1".into(),
            property: property.into(),
            value: Value::Bool(true),
        }
    }

    #[test]
    fn emit_delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            bus.add_listener(move |_| sink.lock().push(tag));
        }

        bus.emit(property_event("gain"));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let bus = EventBus::new();
        let (handle, seen) = recorder(&bus);

        bus.emit(property_event("gain"));
        bus.remove_listener(handle);
        bus.emit(property_event("offset"));

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn removing_absent_listener_is_a_noop() {
        let bus = EventBus::new();
        let (handle, _) = recorder(&bus);
        bus.remove_listener(handle);
        // Same handle again, plus one that never existed.
        bus.remove_listener(handle);
        bus.remove_listener(ListenerHandle(9999));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn batch_delivers_fifo_exactly_once_and_clears_queue() {
        let bus = EventBus::new();
        let (_, seen) = recorder(&bus);

        let batch = bus.batch();
        batch.start();
        batch.queue(property_event("a"));
        batch.queue(property_event("b"));
        assert!(seen.lock().is_empty(), "no delivery before end()");
        batch.end();

        assert_eq!(seen.lock().len(), 2);
        assert!(bus.inner.queue.lock().is_empty());

        // A later emit is immediate again.
        bus.emit(property_event("c"));
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn queue_without_start_degrades_to_emit() {
        let bus = EventBus::new();
        let (_, seen) = recorder(&bus);

        bus.batch().queue(property_event("gain"));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn start_discards_stale_queue() {
        let bus = EventBus::new();
        let (_, seen) = recorder(&bus);

        let batch = bus.batch();
        batch.start();
        batch.queue(property_event("stale"));
        // Restart without ending: the stale event must not survive.
        batch.start();
        batch.queue(property_event("fresh"));
        batch.end();

        let delivered = seen.lock();
        assert_eq!(delivered.len(), 1);
    }

    #[test]
    fn named_handlers_receive_positional_args() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.on("slewFinished", move |args| sink.lock().push(args.to_vec()));
        let sink = Arc::clone(&seen);
        bus.on("slewFinished", move |args| sink.lock().push(args.to_vec()));

        bus.emit_named("slewFinished", &[Value::from("scope-1"), Value::from(42)]);
        bus.emit_named("unrelated", &[]);

        let calls = seen.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec![Value::from("scope-1"), Value::from(42)]);
    }

    #[test]
    fn named_surface_ignores_batch_mode() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&seen);
        bus.on("ping", move |_| *sink.lock() += 1);

        let batch = bus.batch();
        batch.start();
        bus.emit_named("ping", &[]);
        assert_eq!(*seen.lock(), 1, "named delivery is immediate mid-batch");
        batch.end();
    }

    #[test]
    fn off_removes_only_that_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&seen);
        let first = bus.on("ping", move |_| *sink.lock() += 1);
        let sink = Arc::clone(&seen);
        bus.on("ping", move |_| *sink.lock() += 10);

        bus.off("ping", first);
        bus.off("ping", NamedHandle(424_242));
        bus.emit_named("ping", &[]);

        assert_eq!(*seen.lock(), 10);
    }
}
