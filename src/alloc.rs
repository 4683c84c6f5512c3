//! A global allocator that counts live heap bytes while tracing is enabled.
//!
//! Install it in a binary or integration test:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: mcmc_bench::alloc::TracingAllocator = mcmc_bench::alloc::TracingAllocator;
//! ```
//!
//! Without it the counters stay at zero. Use [`crate::monitor::MemoryTrace`] rather than the
//! free functions here.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(false);
// Signed: blocks allocated before a reset may be freed while tracing.
static CURRENT: AtomicIsize = AtomicIsize::new(0);
static PEAK: AtomicIsize = AtomicIsize::new(0);

pub struct TracingAllocator;

impl TracingAllocator {
    #[inline]
    fn record_alloc(size: usize) {
        if ENABLED.load(Ordering::Relaxed) {
            let current = CURRENT.fetch_add(size as isize, Ordering::SeqCst) + size as isize;
            PEAK.fetch_max(current, Ordering::SeqCst);
        }
    }

    #[inline]
    fn record_dealloc(size: usize) {
        if ENABLED.load(Ordering::Relaxed) {
            CURRENT.fetch_sub(size as isize, Ordering::SeqCst);
        }
    }
}

unsafe impl GlobalAlloc for TracingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        Self::record_alloc(layout.size());
        // SAFETY: delegating to the system allocator with the same layout
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        Self::record_alloc(layout.size());
        // SAFETY: delegating to the system allocator with the same layout
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        Self::record_dealloc(layout.size());
        // SAFETY: ptr was allocated by System with the same layout
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        Self::record_dealloc(layout.size());
        Self::record_alloc(new_size);
        // SAFETY: ptr was allocated by System with `layout`
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// Zeroes both counters.
pub fn reset() {
    CURRENT.store(0, Ordering::SeqCst);
    PEAK.store(0, Ordering::SeqCst);
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst);
}

pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

/// `(current, peak)` traced bytes since the last [`reset`], clamped at zero.
pub fn snapshot() -> (u64, u64) {
    let current = CURRENT.load(Ordering::SeqCst).max(0) as u64;
    let peak = PEAK.load(Ordering::SeqCst).max(0) as u64;
    (current, peak)
}
