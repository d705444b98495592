//! Observability metrics for stack-trace deduplication.
//!
//! Provides counters about duplicate decisions, filter rotations and failures
//! for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking deduplication statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Decisions that let the full stack print
    full_stacks: AtomicU64,
    /// Decisions that enabled line suppression
    suppressed_stacks: AtomicU64,
    /// Decisions answered from the decision cache
    cache_hits: AtomicU64,
    /// Windowed filter instances swapped in
    filter_rotations: AtomicU64,
    /// Predicate invocations that panicked
    predicate_failures: AtomicU64,
    /// Evaluator invocations that returned an error
    evaluator_errors: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_full_stack(&self) {
        self.inner.full_stacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed_stack(&self) {
        self.inner.suppressed_stacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.inner.filter_rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_predicate_failure(&self) {
        self.inner.predicate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evaluator_error(&self) {
        self.inner.evaluator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn full_stacks(&self) -> u64 {
        self.inner.full_stacks.load(Ordering::Relaxed)
    }

    pub fn suppressed_stacks(&self) -> u64 {
        self.inner.suppressed_stacks.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.load(Ordering::Relaxed)
    }

    pub fn filter_rotations(&self) -> u64 {
        self.inner.filter_rotations.load(Ordering::Relaxed)
    }

    pub fn predicate_failures(&self) -> u64 {
        self.inner.predicate_failures.load(Ordering::Relaxed)
    }

    pub fn evaluator_errors(&self) -> u64 {
        self.inner.evaluator_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            full_stacks: self.full_stacks(),
            suppressed_stacks: self.suppressed_stacks(),
            cache_hits: self.cache_hits(),
            filter_rotations: self.filter_rotations(),
            predicate_failures: self.predicate_failures(),
            evaluator_errors: self.evaluator_errors(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.full_stacks.store(0, Ordering::Relaxed);
        self.inner.suppressed_stacks.store(0, Ordering::Relaxed);
        self.inner.cache_hits.store(0, Ordering::Relaxed);
        self.inner.filter_rotations.store(0, Ordering::Relaxed);
        self.inner.predicate_failures.store(0, Ordering::Relaxed);
        self.inner.evaluator_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub full_stacks: u64,
    pub suppressed_stacks: u64,
    pub cache_hits: u64,
    pub filter_rotations: u64,
    pub predicate_failures: u64,
    pub evaluator_errors: u64,
}

impl MetricsSnapshot {
    /// Ratio of suppressed decisions to all decisions (0.0 to 1.0).
    ///
    /// Returns 0.0 if no decisions have been made.
    pub fn suppression_rate(&self) -> f64 {
        let total = self.total_decisions();
        if total == 0 {
            0.0
        } else {
            self.suppressed_stacks as f64 / total as f64
        }
    }

    /// Number of computed (non-cached) decisions.
    pub fn total_decisions(&self) -> u64 {
        self.full_stacks.saturating_add(self.suppressed_stacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot {
            full_stacks: 0,
            suppressed_stacks: 0,
            cache_hits: 0,
            filter_rotations: 0,
            predicate_failures: 0,
            evaluator_errors: 0,
        });
    }

    #[test]
    fn test_snapshot_suppression_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().suppression_rate(), 0.0);

        metrics.record_full_stack();
        assert_eq!(metrics.snapshot().suppression_rate(), 0.0);

        metrics.record_suppressed_stack();
        assert!((metrics.snapshot().suppression_rate() - 0.5).abs() < f64::EPSILON);

        metrics.record_suppressed_stack();
        metrics.record_suppressed_stack();
        assert!((metrics.snapshot().suppression_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_hits_not_counted_as_decisions() {
        let metrics = Metrics::new();
        metrics.record_full_stack();
        metrics.record_cache_hit();
        metrics.record_cache_hit();

        assert_eq!(metrics.snapshot().total_decisions(), 1);
        assert_eq!(metrics.cache_hits(), 2);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_full_stack();
        metrics.record_rotation();
        metrics.record_predicate_failure();
        metrics.record_evaluator_error();

        metrics.reset();
        assert_eq!(metrics.snapshot().total_decisions(), 0);
        assert_eq!(metrics.filter_rotations(), 0);
        assert_eq!(metrics.predicate_failures(), 0);
        assert_eq!(metrics.evaluator_errors(), 0);
    }

    #[test]
    fn test_metrics_clone_shares_counters() {
        let metrics1 = Metrics::new();
        metrics1.record_rotation();

        let metrics2 = metrics1.clone();
        metrics2.record_rotation();

        assert_eq!(metrics1.filter_rotations(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = Metrics::new();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_full_stack();
                        m.record_suppressed_stack();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.full_stacks(), 1000);
        assert_eq!(metrics.suppressed_stacks(), 1000);
    }
}
