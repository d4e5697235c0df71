//! Event listeners and the handles that bind them to a bus.

use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use super::bus::{BusId, BusInner};
use super::event::AnyEvent;

/// Something that reacts to fired events.
///
/// Delivery may nest: a listener that fires another event it is subscribed
/// to receives that event before its current `on_event` returns. State that
/// changes on delivery lives behind `Cell`/`RefCell`, and borrows must not be
/// held across a nested `fire`.
pub trait EventListener: 'static {
    fn on_event(&self, event: &dyn AnyEvent);
}

/// Identity of a listener within its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Owning handle to a listener registered with exactly one [`EventBus`].
///
/// Created by [`EventBus::listener`]. Dropping the handle unsubscribes the
/// listener from every event type it was subscribed to.
///
/// [`EventBus`]: super::EventBus
/// [`EventBus::listener`]: super::EventBus::listener
pub struct Listener<T: EventListener> {
    id: ListenerId,
    bus_id: BusId,
    bus: Weak<BusInner>,
    inner: Rc<T>,
}

impl<T: EventListener> Listener<T> {
    pub(crate) fn new(id: ListenerId, bus_id: BusId, bus: Weak<BusInner>, inner: Rc<T>) -> Self {
        Self {
            id,
            bus_id,
            bus,
            inner,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Identity of the bus that constructed this listener.
    pub fn bus_id(&self) -> BusId {
        self.bus_id
    }

    pub fn get(&self) -> &T {
        &self.inner
    }
}

impl<T: EventListener> Deref for Listener<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: EventListener> Drop for Listener<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.forget_listener(self.id);
        }
    }
}

impl<T: EventListener + fmt::Debug> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("bus", &self.bus_id)
            .field("inner", &self.inner)
            .finish()
    }
}

/// Listener whose `on_event` delegates to a stored closure.
pub struct DummyListener<F> {
    callback: F,
}

impl<F> DummyListener<F>
where
    F: Fn(&dyn AnyEvent) + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventListener for DummyListener<F>
where
    F: Fn(&dyn AnyEvent) + 'static,
{
    fn on_event(&self, event: &dyn AnyEvent) {
        (self.callback)(event)
    }
}
