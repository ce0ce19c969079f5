//! All counters use `Relaxed` ordering. Individual counter values are
//! eventually consistent. Cross-counter snapshots may be transiently
//! inconsistent (e.g., total may briefly disagree with the heap-specific
//! counters). This is acceptable for diagnostic display.
//! Do NOT use these values for allocation decisions.

use crate::sync::atomic::{AtomicIsize, Ordering};

/// Diagnostic-only gauge counter.
///
/// Under contention, subtract-before-add races are tolerated and the raw value
/// may transiently dip below zero. Readers should always use `load()`/`get()`,
/// which clamp negative values to zero.
pub struct Counter(AtomicIsize);

impl Counter {
    #[cfg(not(loom))]
    pub const fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    #[cfg(loom)]
    pub fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    #[inline]
    fn delta(val: usize) -> isize {
        // Diagnostic counters only: clamp absurd deltas instead of panicking.
        std::cmp::min(val, isize::MAX as usize).cast_signed()
    }

    #[inline]
    #[allow(dead_code)]
    pub fn add(&self, val: usize) {
        self.0.fetch_add(Self::delta(val), Ordering::Relaxed);
    }

    #[inline]
    pub fn sub(&self, val: usize) {
        self.0.fetch_sub(Self::delta(val), Ordering::Relaxed);
    }

    #[inline]
    #[allow(dead_code)]
    pub fn get(&self) -> usize {
        self.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> usize {
        self.0.load(ordering).max(0).cast_unsigned()
    }

    #[inline]
    pub fn fetch_add(&self, val: usize, ordering: Ordering) -> usize {
        self.0.fetch_add(Self::delta(val), ordering).max(0).cast_unsigned()
    }
}

// Total address space reserved by debug heaps (bookkeeping + user regions)
crate::sync::static_sync! {
    pub static TOTAL_RESERVED: Counter = Counter::new();
}
// Total physical memory committed by debug heaps
crate::sync::static_sync! {
    pub static TOTAL_COMMITTED: Counter = Counter::new();
}

// Committed bytes broken out per concern
crate::sync::static_sync! {
    pub static DEBUG_HEAP_COMMITTED: Counter = Counter::new();
}
// Live (not yet freed) allocations across all debug heaps
crate::sync::static_sync! {
    pub static DEBUG_HEAP_LIVE: Counter = Counter::new();
}

/// Best-effort subtract from a diagnostic atomic counter.
///
/// Uses a single atomic subtraction (no TOCTOU load-then-subtract race).
/// Readers clamp negative transients via `Counter::load`.
pub fn sub_saturating(counter: &Counter, val: usize) {
    counter.sub(val);
}

/// Point-in-time snapshot of the gauge counters.
pub struct MemoryStats {
    pub total_reserved: usize,
    pub total_committed: usize,
    pub heap_committed: usize,
    pub live_allocations: usize,
}

impl MemoryStats {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            total_reserved: TOTAL_RESERVED.load(Ordering::Relaxed),
            total_committed: TOTAL_COMMITTED.load(Ordering::Relaxed),
            heap_committed: DEBUG_HEAP_COMMITTED.load(Ordering::Relaxed),
            live_allocations: DEBUG_HEAP_LIVE.load(Ordering::Relaxed),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_counter_clamps_below_zero() {
        let c = Counter::new();
        c.sub(10);
        assert_eq!(c.get(), 0);
        c.add(25);
        // Raw value is 15 (sub happened first); readers see the raw sum.
        assert_eq!(c.get(), 15);
    }

    #[test]
    fn test_stats_snapshot_captures() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        // Smoke test only: other tests mutate the globals in parallel.
        let _stats = MemoryStats::capture();
    }
}
