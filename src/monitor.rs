/*!
Scoped timing and memory instrumentation for sampling runs.

A [`MemoryTrace`] guard resets and enables the allocation counters of
[`TracingAllocator`](crate::alloc::TracingAllocator) on creation and disables them when dropped,
on every exit path. Only one trace is active at a time; a second [`MemoryTrace::start`] waits
for the first guard to drop.

```rust
use mcmc_bench::monitor::monitor;

let (result, metrics) = monitor(|| Ok::<_, String>((0..1000).sum::<u64>()));
assert_eq!(result, Ok(499_500));
assert!(metrics.elapsed_time >= 0.0);
```
*/

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::debug;

use crate::alloc;

static TRACE_LOCK: Mutex<()> = Mutex::new(());

/// Wall-clock and traced-memory figures for one run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerfMetrics {
    /// Seconds.
    pub elapsed_time: f64,
    /// Traced bytes still live when the run finished.
    pub current_memory: u64,
    /// Highest traced live bytes during the run.
    pub peak_memory: u64,
}

pub struct MemoryTrace {
    start: Instant,
    _lock: MutexGuard<'static, ()>,
}

impl MemoryTrace {
    pub fn start() -> Self {
        let lock = TRACE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        alloc::reset();
        alloc::enable();
        Self {
            start: Instant::now(),
            _lock: lock,
        }
    }

    /// Stops the clock and reads the counters.
    pub fn finish(self) -> PerfMetrics {
        let elapsed_time = self.start.elapsed().as_secs_f64();
        let (current_memory, peak_memory) = alloc::snapshot();
        PerfMetrics {
            elapsed_time,
            current_memory,
            peak_memory,
        }
    }
}

impl Drop for MemoryTrace {
    fn drop(&mut self) {
        alloc::disable();
    }
}

/// Runs `f` inside a [`MemoryTrace`]. The result of `f` is returned unchanged, failures
/// included, together with the metrics of the run.
pub fn monitor<R, E, F>(f: F) -> (Result<R, E>, PerfMetrics)
where
    F: FnOnce() -> Result<R, E>,
{
    let trace = MemoryTrace::start();
    let result = f();
    let metrics = trace.finish();
    debug!(
        elapsed = metrics.elapsed_time,
        peak_bytes = metrics.peak_memory,
        ok = result.is_ok(),
        "monitored run finished"
    );
    (result, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_monitor_measures_time() {
        let (result, metrics) = monitor(|| {
            sleep(Duration::from_millis(20));
            Ok::<_, ()>(7)
        });
        assert_eq!(result, Ok(7));
        assert!(metrics.elapsed_time >= 0.02, "elapsed {}", metrics.elapsed_time);
    }

    #[test]
    fn test_monitor_returns_failure_with_metrics() {
        let (result, metrics) = monitor(|| {
            sleep(Duration::from_millis(5));
            Err::<(), _>("boom")
        });
        assert_eq!(result, Err("boom"));
        assert!(metrics.elapsed_time > 0.0);
    }

    #[test]
    fn test_tracing_disabled_after_drop() {
        {
            let _trace = MemoryTrace::start();
            assert!(alloc::is_enabled());
        }
        // Hold the lock so no other test starts a trace meanwhile.
        let _lock = TRACE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        assert!(!alloc::is_enabled());
    }

    #[test]
    fn test_tracing_disabled_after_panic() {
        let outcome = std::panic::catch_unwind(|| {
            let _trace = MemoryTrace::start();
            panic!("inside trace");
        });
        assert!(outcome.is_err());
        let _lock = TRACE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        assert!(!alloc::is_enabled());
    }
}
