//! ## hearth-core::alloc::stats
//! **Allocation counters and snapshots**
//!
//! Each [`MemoryManager`](super::MemoryManager) owns a set of atomic counters;
//! [`MemoryStats`] is the plain snapshot handed to diagnostics and metrics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Atomic counters updated by the manager on every operation.
#[derive(Debug, Default)]
pub(crate) struct MemoryCounters {
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicU64,
    deallocations: AtomicU64,
    reallocations: AtomicU64,
    rejected_frees: AtomicU64,
    failed_allocations: AtomicU64,
}

impl MemoryCounters {
    #[inline]
    pub(crate) fn record_allocation(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        let live = self.live_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_bytes.fetch_max(live, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deallocation(&self, bytes: usize) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reallocation(&self) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejected_free(&self) {
        self.rejected_frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed_allocation(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live_records: usize) -> MemoryStats {
        MemoryStats {
            live_records,
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            rejected_frees: self.rejected_frees.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Records currently in the table.
    pub live_records: usize,
    /// Sum of `count * size` over live records.
    pub live_bytes: usize,
    /// Highest `live_bytes` ever observed.
    pub peak_bytes: usize,
    pub allocations: u64,
    pub deallocations: u64,
    pub reallocations: u64,
    /// Frees of addresses the manager did not own.
    pub rejected_frees: u64,
    /// Upstream exhaustion or invalid requests.
    pub failed_allocations: u64,
}

impl MemoryStats {
    /// Allocations that have not been matched by a deallocation yet.
    pub fn outstanding(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}
