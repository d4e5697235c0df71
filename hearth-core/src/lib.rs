//! # hearth-core
//!
//! Foundation layer of the hearth runtime: the tracking allocator every
//! component allocates through, and the typed event bus they talk over.
//!
//! ### Key Submodules:
//! - `alloc`: record-tracking `MemoryManager` over system, arena (`bumpalo`) or parent resources
//! - `events`: `EventBus` with ordered synchronous dispatch and a `SegQueue`-backed deferred queue

pub mod alloc;
pub mod events;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::events::*;
}
