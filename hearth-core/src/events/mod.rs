//! ## hearth-core::events
//! **Typed publish/subscribe bus with deferred delivery**
//!
//! Events are plain Rust types implementing [`Event`] with an explicit tag.
//! Listeners are created by an [`EventBus`], may only subscribe on that bus,
//! and unsubscribe themselves when their [`Listener`] handle is dropped.
//!
//! `fire` dispatches synchronously on the calling thread. `post` boxes the
//! event through the bus allocator and queues it on a crossbeam `SegQueue`
//! until the owner calls `process_events`.
//!
//! ### Key Submodules:
//! - `event/`: event identities and the object-safe `AnyEvent` view
//! - `listener/`: listener trait, owning handles, closure listeners
//! - `bus/`: the bus itself

pub mod bus;
pub mod event;
pub mod listener;

pub use bus::{BusId, EventBus, DEFAULT_DRAIN_ROUNDS};
pub use event::{AnyEvent, Event, EventId};
pub use listener::{DummyListener, EventListener, Listener, ListenerId};
