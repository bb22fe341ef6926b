//! Name-keyed publish/subscribe.
//!
//! Handlers are invoked synchronously, in registration order, on the thread
//! that emits. The registration list is snapshotted before iteration, so
//! unlistening during a delivery only affects later deliveries. `once`
//! registrations are removed inside the snapshot, before any handler runs,
//! which guarantees a single delivery even with concurrent emitters.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

/// Shared handler type.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registration<T> {
    token: u64,
    once: bool,
    handler: Handler<T>,
}

struct Registry<K, T> {
    next_token: u64,
    listeners: HashMap<K, Vec<Registration<T>>>,
}

impl<K: Eq + Hash, T> Registry<K, T> {
    fn remove(&mut self, key: &K, token: u64) -> bool {
        let Some(list) = self.listeners.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.token != token);
        let removed = list.len() != before;
        if list.is_empty() {
            let _ = self.listeners.remove(key);
        }
        removed
    }
}

/// Publish/subscribe registry keyed by `K` delivering `&T`.
pub struct EventBus<K, T> {
    registry: Arc<Mutex<Registry<K, T>>>,
}

impl<K, T> Clone for EventBus<K, T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K, T> EventBus<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: 'static,
{
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_token: 1,
                listeners: HashMap::new(),
            })),
        }
    }

    /// Register `handler` under `key`.
    pub fn listen<F>(&self, key: impl Into<K>, handler: F) -> Unlisten
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(key.into(), false, Arc::new(handler))
    }

    /// Register `handler` for a single delivery under `key`.
    pub fn listen_once<F>(&self, key: impl Into<K>, handler: F) -> Unlisten
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(key.into(), true, Arc::new(handler))
    }

    fn register(&self, key: K, once: bool, handler: Handler<T>) -> Unlisten {
        let token = {
            let mut registry = self.registry.lock();
            let token = registry.next_token;
            registry.next_token += 1;
            registry
                .listeners
                .entry(key.clone())
                .or_default()
                .push(Registration {
                    token,
                    once,
                    handler,
                });
            token
        };

        let weak: Weak<Mutex<Registry<K, T>>> = Arc::downgrade(&self.registry);
        Unlisten::new(move || {
            weak.upgrade()
                .is_some_and(|registry| registry.lock().remove(&key, token))
        })
    }

    /// Deliver `payload` to every handler registered under `key`.
    ///
    /// Returns the number of handlers invoked. A panicking handler is logged
    /// and does not stop the handlers after it.
    pub fn emit<Q>(&self, key: &Q, payload: &T) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + fmt::Debug + ?Sized,
    {
        let snapshot: Vec<Handler<T>> = {
            let mut registry = self.registry.lock();
            let Some(list) = registry.listeners.get_mut(key) else {
                trace!(?key, "no listeners");
                return 0;
            };
            let handlers = list.iter().map(|r| Arc::clone(&r.handler)).collect();
            list.retain(|r| !r.once);
            if list.is_empty() {
                let _ = registry.listeners.remove(key);
            }
            handlers
        };

        for handler in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                warn!(?key, "event handler panicked");
            }
        }
        snapshot.len()
    }

    /// Number of live registrations under `key`.
    pub fn listener_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.lock().listeners.get(key).map_or(0, Vec::len)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.registry.lock().listeners.clear();
    }
}

impl<K, T> Default for EventBus<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes exactly one registration. Idempotent.
#[derive(Clone)]
pub struct Unlisten {
    remove: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Unlisten {
    fn new(remove: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            remove: Arc::new(remove),
        }
    }

    /// Remove the registration. Returns `false` if it was already gone.
    pub fn unlisten(&self) -> bool {
        (self.remove)()
    }
}

impl fmt::Debug for Unlisten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlisten").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bus() -> EventBus<String, i32> {
        EventBus::new()
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        assert_eq!(bus().emit("nothing", &1), 0);
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            let _ = bus.listen("tick", move |v: &i32| order.lock().push((n, *v)));
        }
        assert_eq!(bus.emit("tick", &9), 3);
        assert_eq!(*order.lock(), vec![(0, 9), (1, 9), (2, 9)]);
    }

    #[test]
    fn unlisten_removes_only_that_registration() {
        let bus = bus();
        let a = counter();
        let b = counter();
        let a2 = a.clone();
        let b2 = b.clone();
        let first = bus.listen("x", move |_: &i32| {
            let _ = a2.fetch_add(1, Ordering::SeqCst);
        });
        let _second = bus.listen("x", move |_: &i32| {
            let _ = b2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(first.unlisten());
        let _ = bus.emit("x", &0);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unlisten_is_idempotent() {
        let bus = bus();
        let handle = bus.listen("x", |_: &i32| {});
        assert!(handle.unlisten());
        assert!(!handle.unlisten());
        assert!(!handle.clone().unlisten());
        assert_eq!(bus.listener_count("x"), 0);
    }

    #[test]
    fn listen_once_fires_exactly_once() {
        let bus = bus();
        let hits = counter();
        let h = hits.clone();
        let _ = bus.listen_once("ready", move |_: &i32| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit("ready", &1), 1);
        assert_eq!(bus.emit("ready", &2), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("ready"), 0);
    }

    #[test]
    fn listen_once_is_gone_before_handler_body_runs() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(None));
        let inner_bus = bus.clone();
        let seen2 = seen.clone();
        let _ = bus.listen_once("ready", move |_: &i32| {
            *seen2.lock() = Some(inner_bus.listener_count("ready"));
        });
        let _ = bus.emit("ready", &0);
        assert_eq!(*seen.lock(), Some(0));
    }

    #[test]
    fn unlisten_once_before_delivery() {
        let bus = bus();
        let handle = bus.listen_once("ready", |_: &i32| panic!("must not run"));
        assert!(handle.unlisten());
        assert_eq!(bus.emit("ready", &0), 0);
    }

    #[test]
    fn unlisten_during_delivery_applies_to_next_delivery() {
        let bus = bus();
        let hits = counter();
        let slot: Arc<Mutex<Option<Unlisten>>> = Arc::new(Mutex::new(None));

        let slot2 = slot.clone();
        let _ = bus.listen("x", move |_: &i32| {
            if let Some(h) = slot2.lock().as_ref() {
                let _ = h.unlisten();
            }
        });
        let h = hits.clone();
        let second = bus.listen("x", move |_: &i32| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });
        *slot.lock() = Some(second);

        // Snapshot taken before the first handler removes the second.
        assert_eq!(bus.emit("x", &0), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.emit("x", &0), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_later_handlers() {
        let bus = bus();
        let hits = counter();
        let _ = bus.listen("x", |_: &i32| panic!("boom"));
        let h = hits.clone();
        let _ = bus.listen("x", move |_: &i32| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.emit("x", &0), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn keys_are_independent() {
        let bus = bus();
        let _ = bus.listen("a", |_: &i32| {});
        let _ = bus.listen("b", |_: &i32| {});
        let _ = bus.listen("b", |_: &i32| {});
        assert_eq!(bus.listener_count("a"), 1);
        assert_eq!(bus.listener_count("b"), 2);
        bus.clear();
        assert_eq!(bus.listener_count("b"), 0);
    }

    #[test]
    fn unlisten_after_bus_dropped_is_noop() {
        let bus = bus();
        let handle = bus.listen("x", |_: &i32| {});
        drop(bus);
        assert!(!handle.unlisten());
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Channel {
        Up,
        Down,
    }

    #[test]
    fn enum_keyed_bus_unlistens_from_another_thread() {
        let bus: EventBus<Channel, i32> = EventBus::default();
        let hits = counter();
        let h = hits.clone();
        let handle = bus.listen(Channel::Up, move |_: &i32| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });
        let _ = bus.listen(Channel::Down, |_: &i32| {});

        assert_eq!(bus.emit(&Channel::Up, &1), 1);
        let removed = std::thread::spawn(move || handle.unlisten()).join().unwrap();
        assert!(removed);
        assert_eq!(bus.emit(&Channel::Up, &2), 0);
        assert_eq!(bus.listener_count(&Channel::Down), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
