//! ## hearth-core::alloc::arena
//! **Bump arena resource using `bumpalo`**
//!
//! Arena memory is handed out by bumping a pointer; individual frees are
//! no-ops and everything is released at once on [`reset`](ArenaResource::reset)
//! or drop. Good for frame-scoped scratch data such as deferred events.

use std::alloc::Layout;
use std::ptr::NonNull;

use bumpalo::Bump;
use parking_lot::Mutex;

use super::resource::MemoryResource;

/// A [`MemoryResource`] backed by a `bumpalo::Bump`.
#[derive(Debug, Default)]
pub struct ArenaResource {
    bump: Mutex<Bump>,
}

impl ArenaResource {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            bump: Mutex::new(Bump::new()),
        }
    }

    /// Creates an arena with room for `capacity` bytes before it has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bump: Mutex::new(Bump::with_capacity(capacity)),
        }
    }

    /// Bytes currently reserved from the system by the arena's chunks.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.lock().allocated_bytes()
    }
}

impl MemoryResource for ArenaResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.bump.lock().try_alloc_layout(layout).ok()
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn reset(&self) -> bool {
        self.bump.lock().reset();
        true
    }

    fn name(&self) -> &'static str {
        "arena"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_allocates_distinct_blocks() {
        let arena = ArenaResource::new();
        let layout = Layout::new::<u64>();
        let a = arena.allocate(layout).unwrap();
        let b = arena.allocate(layout).unwrap();
        assert_ne!(a, b);

        // Safety: both blocks are live and sized for a u64.
        unsafe {
            a.cast::<u64>().as_ptr().write(123);
            b.cast::<u64>().as_ptr().write(456);
            assert_eq!(*a.cast::<u64>().as_ptr(), 123);
            assert_eq!(*b.cast::<u64>().as_ptr(), 456);
        }
    }

    #[test]
    fn arena_reset_keeps_it_usable() {
        let arena = ArenaResource::with_capacity(1024);
        arena.allocate(Layout::new::<[u8; 256]>()).unwrap();
        assert!(arena.reset());
        let value = arena.allocate(Layout::new::<u32>()).unwrap();
        unsafe {
            value.cast::<u32>().as_ptr().write(333);
            assert_eq!(*value.cast::<u32>().as_ptr(), 333);
        }
    }
}
