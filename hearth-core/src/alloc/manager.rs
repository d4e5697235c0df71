//! ## hearth-core::alloc::manager
//! **The record-tracking allocator**
//!
//! [`MemoryManager`] is a drop-in allocator that records every block it
//! hands out. Records are keyed by a never-reused allocation index and looked
//! up by address on free, so a double free or a foreign pointer is caught
//! instead of corrupting the upstream heap.

use std::alloc::Layout;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use super::record::MemoryRecord;
use super::resource::{MemoryResource, PassthroughResource, SystemResource};
use super::stats::{MemoryCounters, MemoryStats};

/// Alignment used by [`MemoryManager::allocate`]; matches C's `max_align_t`.
pub const DEFAULT_ALIGN: usize = 16;

/// Allocator error conditions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("upstream resource '{resource}' is out of memory ({bytes} bytes requested)")]
    Exhausted { resource: &'static str, bytes: usize },

    #[error("zero-sized allocation requested")]
    ZeroSized,

    #[error("allocation size overflows ({count} x {size} bytes)")]
    Overflow { count: usize, size: usize },

    #[error("invalid alignment {0}")]
    InvalidAlign(usize),

    #[error("address {0:#x} is not owned by this allocator (double or foreign free)")]
    UnknownAddress(usize),

    #[error("{0} allocations are still live")]
    LiveAllocations(usize),
}

/// What to do when asked to free an address that has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreePolicy {
    /// Panic. Continuing after a double free risks memory corruption.
    Panic,
    /// Log at `error`, count it, and return [`AllocError::UnknownAddress`].
    Ignore,
}

impl Default for FreePolicy {
    /// `Panic` in debug builds, `Ignore` in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            FreePolicy::Panic
        } else {
            FreePolicy::Ignore
        }
    }
}

#[derive(Default)]
struct RecordTable {
    counter: u64,
    records: BTreeMap<u64, MemoryRecord>,
    by_address: HashMap<usize, u64>,
}

impl RecordTable {
    fn insert(&mut self, count: usize, size: usize, address: NonNull<u8>, align: usize) -> u64 {
        self.counter += 1;
        let index = self.counter;
        self.records.insert(
            index,
            MemoryRecord {
                index,
                count,
                size,
                address: address.as_ptr(),
                align,
            },
        );
        self.by_address.insert(address.as_ptr() as usize, index);
        index
    }

    fn remove(&mut self, address: usize) -> Option<MemoryRecord> {
        let index = self.by_address.remove(&address)?;
        self.records.remove(&index)
    }

    fn get_by_address(&self, address: usize) -> Option<&MemoryRecord> {
        self.by_address
            .get(&address)
            .and_then(|index| self.records.get(index))
    }
}

/// Record-tracking allocator over an upstream [`MemoryResource`].
///
/// Internally synchronized, so one instance is usually shared as
/// `Arc<MemoryManager>` by every component of an application.
pub struct MemoryManager {
    upstream: Box<dyn MemoryResource>,
    table: Mutex<RecordTable>,
    counters: MemoryCounters,
    free_policy: FreePolicy,
}

impl MemoryManager {
    /// Creates a manager over `upstream` with the default [`FreePolicy`].
    pub fn new(upstream: impl MemoryResource + 'static) -> Self {
        Self {
            upstream: Box::new(upstream),
            table: Mutex::new(RecordTable::default()),
            counters: MemoryCounters::default(),
            free_policy: FreePolicy::default(),
        }
    }

    /// Creates a manager over the process heap.
    pub fn system() -> Self {
        Self::new(SystemResource)
    }

    /// Creates a manager whose blocks come from (and are recorded by) `parent`.
    pub fn scoped(parent: &Arc<MemoryManager>) -> Self {
        Self::new(PassthroughResource::new(parent.clone())).with_free_policy(parent.free_policy)
    }

    /// Sets the policy for frees of unknown addresses.
    pub fn with_free_policy(mut self, policy: FreePolicy) -> Self {
        self.free_policy = policy;
        self
    }

    pub fn free_policy(&self) -> FreePolicy {
        self.free_policy
    }

    /// Name of the upstream resource.
    pub fn resource_name(&self) -> &'static str {
        self.upstream.name()
    }

    /// Allocates `count * size` bytes at [`DEFAULT_ALIGN`].
    pub fn allocate(&self, count: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
        let bytes = count
            .checked_mul(size)
            .ok_or(AllocError::Overflow { count, size })
            .inspect_err(|_| self.counters.record_failed_allocation())?;
        let layout = Layout::from_size_align(bytes, DEFAULT_ALIGN)
            .map_err(|_| AllocError::Overflow { count, size })
            .inspect_err(|_| self.counters.record_failed_allocation())?;
        self.allocate_raw(count, size, layout)
    }

    /// Allocates a single block honoring `layout`'s alignment.
    pub fn allocate_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.allocate_raw(1, layout.size(), layout)
    }

    fn allocate_raw(
        &self,
        count: usize,
        size: usize,
        layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            self.counters.record_failed_allocation();
            return Err(AllocError::ZeroSized);
        }

        let Some(address) = self.upstream.allocate(layout) else {
            self.counters.record_failed_allocation();
            error!(
                resource = self.upstream.name(),
                bytes = layout.size(),
                "upstream allocation failed"
            );
            return Err(AllocError::Exhausted {
                resource: self.upstream.name(),
                bytes: layout.size(),
            });
        };

        let index = self
            .table
            .lock()
            .insert(count, size, address, layout.align());
        self.counters.record_allocation(layout.size());
        trace!(index, count, size, address = ?address, "allocate");
        Ok(address)
    }

    /// Frees a block previously returned by this manager.
    ///
    /// A null `address` is a no-op. An address without a record is a double
    /// or foreign free and is handled according to the [`FreePolicy`].
    pub fn deallocate(&self, address: *mut u8) -> Result<(), AllocError> {
        let Some(ptr) = NonNull::new(address) else {
            return Ok(());
        };

        let record = self.table.lock().remove(address as usize);
        match record {
            Some(record) => {
                // SAFETY: the record proves the block came from `upstream`
                // with this layout, and it is removed so it cannot be freed twice.
                unsafe { self.upstream.deallocate(ptr, record.layout()) };
                self.counters.record_deallocation(record.bytes());
                trace!(index = record.index, address = ?ptr, "deallocate");
                Ok(())
            }
            None => self.reject_free(address as usize),
        }
    }

    fn reject_free(&self, address: usize) -> Result<(), AllocError> {
        self.counters.record_rejected_free();
        match self.free_policy {
            FreePolicy::Panic => {
                panic!("free of unknown address {address:#x} (double free or foreign pointer)")
            }
            FreePolicy::Ignore => {
                error!(address = format_args!("{address:#x}"), "ignoring free of unknown address");
                Err(AllocError::UnknownAddress(address))
            }
        }
    }

    /// Resizes a block.
    ///
    /// - `new_size == 0` frees `address` and returns `None`;
    /// - a null `address` allocates `new_size` bytes;
    /// - `new_size <= old_size` returns `address` unchanged;
    /// - otherwise a new block is allocated, `old_size` bytes are copied and
    ///   the old block is freed.
    pub fn reallocate(
        &self,
        address: *mut u8,
        old_size: usize,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        if new_size == 0 {
            self.deallocate(address)?;
            return Ok(None);
        }
        let Some(old) = NonNull::new(address) else {
            return self.allocate(1, new_size).map(Some);
        };
        if new_size <= old_size {
            return Ok(Some(old));
        }

        let (align, recorded) = match self.table.lock().get_by_address(address as usize) {
            Some(record) => (record.align, record.bytes()),
            None => {
                self.reject_free(address as usize)?;
                return Err(AllocError::UnknownAddress(address as usize));
            }
        };
        if old_size > recorded {
            warn!(old_size, recorded, "reallocate old_size exceeds the recorded block");
        }

        let layout =
            Layout::from_size_align(new_size, align).map_err(|_| AllocError::InvalidAlign(align))?;
        let new = self.allocate_raw(1, new_size, layout)?;
        // SAFETY: both blocks are live, distinct, and at least
        // `min(old_size, recorded)` bytes long.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_size.min(recorded)) };
        self.deallocate(address)?;
        self.counters.record_reallocation();
        Ok(Some(new))
    }

    /// Moves `value` into a block owned by this manager.
    ///
    /// Zero-sized types still get a one-byte record so the pointer can be
    /// freed through [`delete_object`](Self::delete_object).
    pub fn new_object<T>(&self, value: T) -> Result<NonNull<T>, AllocError> {
        let layout = Layout::new::<T>();
        let layout = Layout::from_size_align(layout.size().max(1), layout.align())
            .map_err(|_| AllocError::InvalidAlign(layout.align()))?;
        let ptr = self.allocate_layout(layout)?.cast::<T>();
        // SAFETY: freshly allocated, correctly aligned and sized for T.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Drops the object at `ptr` in place and frees its block.
    ///
    /// The object is only dropped if this manager owns the block; otherwise
    /// the call is treated as a foreign free.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live, initialized `T` created through
    /// [`new_object`](Self::new_object) (possibly unsized afterwards) and must
    /// not be used after this call.
    pub unsafe fn delete_object<T: ?Sized>(&self, ptr: NonNull<T>) -> Result<(), AllocError> {
        let address = ptr.cast::<u8>().as_ptr();
        if !self.owns(address) {
            return self.reject_free(address as usize);
        }
        ptr::drop_in_place(ptr.as_ptr());
        self.deallocate(address)
    }

    /// Whether `address` is a live block of this manager.
    pub fn owns(&self, address: *const u8) -> bool {
        self.table.lock().by_address.contains_key(&(address as usize))
    }

    /// Releases all upstream memory at once, if the resource supports it.
    ///
    /// Refused while any record is live.
    pub fn release_upstream(&self) -> Result<bool, AllocError> {
        let live = self.record_count();
        if live != 0 {
            return Err(AllocError::LiveAllocations(live));
        }
        Ok(self.upstream.reset())
    }

    // --- Diagnostics ---

    /// Number of live records.
    pub fn record_count(&self) -> usize {
        self.table.lock().records.len()
    }

    /// The `i`-th live record, oldest first.
    pub fn record_at(&self, i: usize) -> Option<MemoryRecord> {
        self.table.lock().records.values().nth(i).copied()
    }

    /// The record with allocation index `index`, if still live.
    pub fn query_record(&self, index: u64) -> Option<MemoryRecord> {
        self.table.lock().records.get(&index).copied()
    }

    pub fn count_at(&self, i: usize) -> Option<usize> {
        self.record_at(i).map(|r| r.count)
    }

    pub fn size_at(&self, i: usize) -> Option<usize> {
        self.record_at(i).map(|r| r.size)
    }

    pub fn address_at(&self, i: usize) -> Option<*mut u8> {
        self.record_at(i).map(|r| r.address)
    }

    /// Snapshot of every live record, oldest first.
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.table.lock().records.values().copied().collect()
    }

    /// Sum of `count * size` over live records.
    pub fn live_bytes(&self) -> usize {
        self.table.lock().records.values().map(MemoryRecord::bytes).sum()
    }

    pub fn stats(&self) -> MemoryStats {
        self.counters.snapshot(self.record_count())
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("resource", &self.upstream.name())
            .field("records", &self.record_count())
            .field("free_policy", &self.free_policy)
            .finish()
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        if table.records.is_empty() {
            debug!(resource = self.upstream.name(), "memory manager dropped clean");
            return;
        }
        let bytes: usize = table.records.values().map(MemoryRecord::bytes).sum();
        warn!(
            resource = self.upstream.name(),
            records = table.records.len(),
            bytes,
            "memory manager dropped with live allocations; leaking them"
        );
    }
}
