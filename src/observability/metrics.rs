//! Compiler counters
//!
//! Monotonic, process-local, lock-free.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct CompilerMetrics {
    compiled: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
    uncosted_plans: AtomicU64,
    execution_failures: AtomicU64,
}

impl CompilerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_compiled(&self) {
        self.compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_uncosted(&self) {
        self.uncosted_plans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_execution_failures(&self) {
        self.execution_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            compiled: self.compiled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            uncosted_plans: self.uncosted_plans.load(Ordering::Relaxed),
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub compiled: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub uncosted_plans: u64,
    pub execution_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(CompilerMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let metrics = CompilerMetrics::new();
        metrics.increment_compiled();
        metrics.increment_compiled();
        metrics.increment_rejected();
        metrics.increment_uncosted();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.compiled, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.uncosted_plans, 1);
        assert_eq!(snapshot.timeouts, 0);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["compiled"], 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(CompilerMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.increment_compiled();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().compiled, 1000);
    }
}
