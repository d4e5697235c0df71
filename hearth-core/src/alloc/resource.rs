//! ## hearth-core::alloc::resource
//! **Upstream memory resources**
//!
//! A [`MemoryResource`] is where a [`MemoryManager`] actually gets its bytes
//! from. The manager adds bookkeeping on top; resources stay dumb.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;
use std::sync::Arc;

use super::manager::MemoryManager;

/// Source of raw memory blocks for a [`MemoryManager`].
pub trait MemoryResource: Send + Sync {
    /// Allocates a block for `layout`, or `None` when exhausted.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block previously obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must come from this resource with the same `layout`, and must not
    /// be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Releases every block at once, if the resource supports it.
    ///
    /// Returns `false` when the resource has no bulk release.
    fn reset(&self) -> bool {
        false
    }

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// The process heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // SAFETY: callers never pass a zero-sized layout (the manager rejects them).
        NonNull::new(unsafe { System.alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        System.dealloc(ptr.as_ptr(), layout);
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Forwards every request to a parent [`MemoryManager`].
///
/// A manager built on top of this keeps its own record table while the same
/// blocks also show up in the parent's table, so a subsystem can be accounted
/// for separately without leaving the application-wide picture.
#[derive(Debug, Clone)]
pub struct PassthroughResource {
    parent: Arc<MemoryManager>,
}

impl PassthroughResource {
    pub fn new(parent: Arc<MemoryManager>) -> Self {
        Self { parent }
    }

    /// The manager requests are forwarded to.
    pub fn parent(&self) -> &Arc<MemoryManager> {
        &self.parent
    }
}

impl MemoryResource for PassthroughResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.parent.allocate_layout(layout).ok()
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        // The parent's record already knows the layout.
        let _ = self.parent.deallocate(ptr.as_ptr());
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
