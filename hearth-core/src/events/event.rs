//! Event payloads and their stable identities.

use std::any::Any;
use std::fmt;

/// Stable identity of an event type.
///
/// Computed at compile time as FNV-1a-64 over an explicit tag chosen by the
/// event's author, so it does not depend on compiler type names or layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Hashes `tag` into an identity. Usable in `const` context.
    pub const fn from_tag(tag: &str) -> Self {
        let bytes = tag.as_bytes();
        let mut hash = Self::OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::PRIME);
            i += 1;
        }
        EventId(hash)
    }

    /// Wraps an explicitly assigned numeric identity.
    pub const fn from_raw(raw: u64) -> Self {
        EventId(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({:#018x})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A concrete event type.
///
/// ```
/// use hearth_core::events::Event;
///
/// struct WindowResized { width: u32, height: u32 }
///
/// impl Event for WindowResized {
///     const TAG: &'static str = "window.resized";
/// }
/// ```
pub trait Event: Any {
    /// Explicit, globally unique tag. Changing it changes [`Event::ID`].
    const TAG: &'static str;

    /// Identity used as the dispatch key.
    const ID: EventId = EventId::from_tag(Self::TAG);
}

/// Object-safe view of an [`Event`], as seen by listeners.
pub trait AnyEvent: Any {
    fn event_id(&self) -> EventId;
    fn event_tag(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Event> AnyEvent for E {
    #[inline]
    fn event_id(&self) -> EventId {
        E::ID
    }

    #[inline]
    fn event_tag(&self) -> &'static str {
        E::TAG
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn AnyEvent {
    /// Whether this event is an `E`.
    #[inline]
    pub fn is<E: Event>(&self) -> bool {
        self.event_id() == E::ID && self.as_any().is::<E>()
    }

    /// Returns the payload as an `E`, if it is one.
    #[inline]
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        if self.event_id() != E::ID {
            return None;
        }
        self.as_any().downcast_ref::<E>()
    }
}

impl fmt::Debug for dyn AnyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyEvent")
            .field("tag", &self.event_tag())
            .field("id", &self.event_id())
            .finish()
    }
}
