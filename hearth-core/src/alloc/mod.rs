//! ## hearth-core::alloc
//! **Record-tracking allocator and the memory resources behind it**
//!
//! Every component of the runtime allocates through an explicitly constructed
//! [`MemoryManager`] handed to it at construction (usually as
//! `Arc<MemoryManager>`). The manager forwards to an upstream
//! [`MemoryResource`] and keeps one [`MemoryRecord`] per live block, which
//! is what leak and usage diagnostics read.
//!
//! ### Key Submodules:
//! - `manager/`: the tracking allocator and its record table
//! - `resource/`: upstream resources (system heap, passthrough to a parent manager)
//! - `arena/`: bump arena resource using `bumpalo`
//! - `stats/`: allocation counters and snapshots

pub mod arena;
pub mod manager;
pub mod record;
pub mod resource;
pub mod stats;

pub use arena::ArenaResource;
pub use manager::{AllocError, FreePolicy, MemoryManager, DEFAULT_ALIGN};
pub use record::MemoryRecord;
pub use resource::{MemoryResource, PassthroughResource, SystemResource};
pub use stats::MemoryStats;
