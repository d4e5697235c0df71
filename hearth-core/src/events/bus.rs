//! Synchronous and deferred event dispatch with stable listener ordering.
//!
//! Listeners are notified in subscription order: first subscribed, first
//! notified. Later listeners may rely on earlier ones having already reacted.
//! Dispatch runs on the calling thread and is not isolated: a panicking
//! listener aborts the remaining dispatch for that fire. A listener may fire
//! from inside `on_event`; the nested dispatch completes, including delivery
//! back to that listener, before the outer one resumes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use tracing::{debug, error, trace, warn};

use super::event::{AnyEvent, Event, EventId};
use super::listener::{DummyListener, EventListener, Listener, ListenerId};
use crate::alloc::{AllocError, MemoryManager};

/// Default number of drain rounds in [`EventBus::process_events`].
pub const DEFAULT_DRAIN_ROUNDS: usize = 16;

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an [`EventBus`], captured by every listener it constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(u64);

impl BusId {
    fn next() -> Self {
        BusId(NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Event boxed through the bus allocator, waiting in the deferred queue.
struct QueuedEvent {
    event: NonNull<dyn AnyEvent>,
    memory: Arc<MemoryManager>,
}

impl QueuedEvent {
    fn get(&self) -> &dyn AnyEvent {
        // SAFETY: `event` was created by `memory.new_object` and stays live
        // until this value is dropped.
        unsafe { self.event.as_ref() }
    }
}

impl Drop for QueuedEvent {
    fn drop(&mut self) {
        // SAFETY: allocated by `memory.new_object`, dropped exactly once here.
        if let Err(e) = unsafe { self.memory.delete_object(self.event) } {
            error!("Failed to free queued event: {e}");
        }
    }
}

type DynListener = dyn EventListener;

pub(crate) struct BusInner {
    id: BusId,
    memory: Arc<MemoryManager>,
    next_listener: Cell<u64>,
    listeners: RefCell<HashMap<ListenerId, Weak<DynListener>>>,
    categories: RefCell<HashMap<EventId, Vec<ListenerId>>>,
    tags: RefCell<HashMap<EventId, &'static str>>,
    queue: SegQueue<QueuedEvent>,
    drain_rounds: Cell<usize>,
    warn_on_unhandled: Cell<bool>,
    fired: Cell<u64>,
}

impl BusInner {
    /// Removes a listener from every category and from the registry.
    pub(crate) fn forget_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
        let removed = self.remove_from_categories(id);
        trace!(listener = id.as_u64(), removed, "listener dropped");
    }

    fn remove_from_categories(&self, id: ListenerId) -> usize {
        let mut removed = 0;
        self.categories.borrow_mut().retain(|_, members| {
            let before = members.len();
            members.retain(|member| *member != id);
            removed += before - members.len();
            !members.is_empty()
        });
        removed
    }

    fn check_tag(&self, id: EventId, tag: &'static str) {
        let mut tags = self.tags.borrow_mut();
        match tags.get(&id) {
            Some(known) if *known != tag => invariant_violation(format_args!(
                "event tags '{known}' and '{tag}' collide on {id:?}"
            )),
            Some(_) => {}
            None => {
                tags.insert(id, tag);
            }
        }
    }

    fn is_subscribed(&self, event: EventId, listener: ListenerId) -> bool {
        self.categories
            .borrow()
            .get(&event)
            .is_some_and(|members| members.contains(&listener))
    }
}

/// Logic errors that indicate a corrupted invariant: loud in debug builds.
fn invariant_violation(message: fmt::Arguments<'_>) {
    if cfg!(debug_assertions) {
        panic!("{message}");
    }
    error!("{message}");
}

/// Single-threaded publish/subscribe bus.
///
/// Cloning produces another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl EventBus {
    /// Creates a bus whose deferred queue allocates through `memory`.
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        let id = BusId::next();
        debug!(bus = id.0, resource = memory.resource_name(), "event bus created");
        Self {
            inner: Rc::new(BusInner {
                id,
                memory,
                next_listener: Cell::new(1),
                listeners: RefCell::new(HashMap::new()),
                categories: RefCell::new(HashMap::new()),
                tags: RefCell::new(HashMap::new()),
                queue: SegQueue::new(),
                drain_rounds: Cell::new(DEFAULT_DRAIN_ROUNDS),
                warn_on_unhandled: Cell::new(false),
                fired: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> BusId {
        self.inner.id
    }

    /// Allocator used for deferred events.
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.inner.memory
    }

    /// Bounds how many rounds [`process_events`](Self::process_events) drains
    /// when listeners keep posting. At least one round always runs.
    pub fn set_drain_rounds(&self, rounds: usize) {
        self.inner.drain_rounds.set(rounds.max(1));
    }

    /// Log at `warn` when an event is fired with no listener.
    pub fn set_warn_on_unhandled(&self, warn: bool) {
        self.inner.warn_on_unhandled.set(warn);
    }

    /// Wraps `value` into a listener bound to this bus.
    pub fn listener<T: EventListener>(&self, value: T) -> Listener<T> {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);

        let inner = Rc::new(value);
        let erased: Rc<DynListener> = inner.clone();
        self.inner
            .listeners
            .borrow_mut()
            .insert(id, Rc::downgrade(&erased));

        Listener::new(id, self.inner.id, Rc::downgrade(&self.inner), inner)
    }

    /// Listener whose `on_event` calls `callback`.
    pub fn closure_listener<F>(&self, callback: F) -> Listener<DummyListener<F>>
    where
        F: Fn(&dyn AnyEvent) + 'static,
    {
        self.listener(DummyListener::new(callback))
    }

    /// Subscribes `listener` to `E`.
    ///
    /// Returns `false` without doing anything if the listener belongs to
    /// another bus or is already subscribed to `E`.
    pub fn subscribe<E: Event, T: EventListener>(&self, listener: &Listener<T>) -> bool {
        self.subscribe_id(E::ID, E::TAG, listener)
    }

    pub(crate) fn subscribe_id<T: EventListener>(
        &self,
        event: EventId,
        tag: &'static str,
        listener: &Listener<T>,
    ) -> bool {
        if listener.bus_id() != self.inner.id {
            warn!(
                listener = listener.id().as_u64(),
                event = tag,
                "refusing subscription of a listener owned by another bus"
            );
            return false;
        }
        self.inner.check_tag(event, tag);

        let mut categories = self.inner.categories.borrow_mut();
        let members = categories.entry(event).or_default();
        if members.contains(&listener.id()) {
            return false;
        }
        members.push(listener.id());
        trace!(listener = listener.id().as_u64(), event = tag, "subscribed");
        true
    }

    /// Unsubscribes `listener` from `E`. Returns `false` if it was not subscribed.
    pub fn unsubscribe<E: Event, T: EventListener>(&self, listener: &Listener<T>) -> bool {
        if listener.bus_id() != self.inner.id {
            return false;
        }
        let mut categories = self.inner.categories.borrow_mut();
        let Some(members) = categories.get_mut(&E::ID) else {
            return false;
        };
        let Some(position) = members.iter().position(|m| *m == listener.id()) else {
            return false;
        };
        members.remove(position);
        if members.is_empty() {
            categories.remove(&E::ID);
        }
        true
    }

    /// Unsubscribes `listener` from every event type.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe_all<T: EventListener>(&self, listener: &Listener<T>) -> usize {
        if listener.bus_id() != self.inner.id {
            return 0;
        }
        self.inner.remove_from_categories(listener.id())
    }

    /// Whether `listener` is subscribed to `E`.
    pub fn is_subscribed<E: Event, T: EventListener>(&self, listener: &Listener<T>) -> bool {
        listener.bus_id() == self.inner.id && self.inner.is_subscribed(E::ID, listener.id())
    }

    /// Dispatches `event` to its listeners, in subscription order.
    ///
    /// Returns the number of listeners notified.
    pub fn fire<E: Event>(&self, event: &E) -> usize {
        self.fire_dyn(event)
    }

    /// Type-erased [`fire`](Self::fire).
    pub fn fire_dyn(&self, event: &dyn AnyEvent) -> usize {
        let id = event.event_id();
        let tag = event.event_tag();
        self.inner.check_tag(id, tag);
        self.inner.fired.set(self.inner.fired.get() + 1);

        // Snapshot so listeners may (un)subscribe while being notified.
        let targets: Vec<(ListenerId, Weak<DynListener>)> = {
            let categories = self.inner.categories.borrow();
            let listeners = self.inner.listeners.borrow();
            categories
                .get(&id)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|member| listeners.get(member).map(|l| (*member, l.clone())))
                        .collect()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            if self.inner.warn_on_unhandled.get() {
                warn!(event = tag, "event fired with no listener");
            }
            return 0;
        }

        let mut notified = 0;
        for (listener_id, weak) in targets {
            // Skip listeners removed by an earlier listener during this dispatch.
            if !self.inner.is_subscribed(id, listener_id) {
                continue;
            }
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            listener.on_event(event);
            notified += 1;
        }
        trace!(event = tag, notified, "fired");
        notified
    }

    /// Queues `event` for the next [`process_events`](Self::process_events).
    pub fn post<E: Event>(&self, event: E) -> Result<(), AllocError> {
        let typed = self.inner.memory.new_object(event)?;
        let erased: NonNull<dyn AnyEvent> = typed;
        self.inner.queue.push(QueuedEvent {
            event: erased,
            memory: self.inner.memory.clone(),
        });
        Ok(())
    }

    /// Fires queued events in the order they were posted.
    ///
    /// Events posted by listeners while draining are fired in later rounds of
    /// the same call, up to the configured number of rounds; anything still
    /// queued after that waits for the next call. Returns the number fired.
    pub fn process_events(&self) -> usize {
        let mut processed = 0;
        for _ in 0..self.inner.drain_rounds.get() {
            let pending = self.inner.queue.len();
            if pending == 0 {
                return processed;
            }
            for _ in 0..pending {
                let Some(queued) = self.inner.queue.pop() else {
                    break;
                };
                self.fire_dyn(queued.get());
                processed += 1;
            }
        }
        if !self.inner.queue.is_empty() {
            warn!(
                remaining = self.inner.queue.len(),
                "deferred events still queued after drain limit"
            );
        }
        processed
    }

    /// Drops every queued event without firing it.
    pub fn clear_pending(&self) -> usize {
        let mut dropped = 0;
        while self.inner.queue.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Events waiting in the deferred queue.
    pub fn pending_events(&self) -> usize {
        self.inner.queue.len()
    }

    /// Listeners subscribed to `E`.
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listener_count_for(E::ID)
    }

    pub fn listener_count_for(&self, event: EventId) -> usize {
        self.inner
            .categories
            .borrow()
            .get(&event)
            .map_or(0, Vec::len)
    }

    /// Event types with at least one listener.
    pub fn category_count(&self) -> usize {
        self.inner.categories.borrow().len()
    }

    /// Listener handles alive on this bus, subscribed or not.
    pub fn live_listeners(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Number of fires since the bus was created, including deferred ones.
    pub fn fired_count(&self) -> u64 {
        self.inner.fired.get()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.inner.id)
            .field("categories", &self.category_count())
            .field("listeners", &self.live_listeners())
            .field("pending", &self.pending_events())
            .finish()
    }
}
