//! Bookkeeping entry for one live allocation.

use std::alloc::Layout;

/// One live allocation made through a [`MemoryManager`](super::MemoryManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRecord {
    /// Allocation counter value. Starts at 1, never reused.
    pub index: u64,
    /// Number of elements requested.
    pub count: usize,
    /// Size of a single element in bytes.
    pub size: usize,
    /// Address handed out to the caller.
    pub address: *mut u8,
    /// Alignment the block was allocated with.
    pub align: usize,
}

// SAFETY: the record never dereferences `address`; it is an opaque key used
// for lookup and diagnostics only.
unsafe impl Send for MemoryRecord {}
unsafe impl Sync for MemoryRecord {}

impl MemoryRecord {
    /// Total number of bytes covered by this record (`count * size`).
    #[inline]
    pub fn bytes(&self) -> usize {
        self.count * self.size
    }

    pub(crate) fn layout(&self) -> Layout {
        // Built from a layout that was already validated on allocation.
        Layout::from_size_align(self.bytes(), self.align).unwrap_or(Layout::new::<u8>())
    }
}
