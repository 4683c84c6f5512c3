//! Memory figures of the monitor with the tracing allocator installed.

use mcmc_bench::alloc::{self, TracingAllocator};
use mcmc_bench::monitor::monitor;

#[global_allocator]
static GLOBAL: TracingAllocator = TracingAllocator;

#[test]
fn test_monitor_traces_peak_memory() {
    let (result, metrics) = monitor(|| {
        let buffer = std::hint::black_box(vec![1u8; 1 << 20]);
        Ok::<_, ()>(buffer.iter().map(|&b| b as usize).sum::<usize>())
    });
    assert_eq!(result, Ok(1 << 20));
    assert!(
        metrics.peak_memory >= 1 << 20,
        "peak {} below the 1 MiB allocated",
        metrics.peak_memory
    );
    // The buffer was freed before the trace finished.
    assert!(metrics.current_memory < 1 << 20);
    assert!(!alloc::is_enabled());

    let (_, untraced) = monitor(|| Ok::<_, ()>(()));
    assert!(untraced.peak_memory < 1 << 20);
}
