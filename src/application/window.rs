//! Time-windowed probabilistic filters.
//!
//! A windowed filter owns one "current" filter instance and replaces it with a
//! fresh, empty one whenever a rebuild interval has elapsed. Rebuilds are lazy:
//! they happen on the query that first notices the interval is over. Exactly
//! one caller wins the compare-and-swap on the rebuild timestamp and swaps the
//! new instance in; everyone else keeps using whichever instance is current,
//! without blocking.
//!
//! The counting variant works around the per-item ceiling of
//! [`CountingFilter`] by splitting the window into sub-windows of
//! [`MAX_COUNT`] occurrences each, the last one taking the remainder.

use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::filter::{
    capacity_for, BloomFilter, CountingFilter, ProbabilisticFilter, MAX_COUNT,
};
use crate::domain::signature::StackSignature;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type FilterFactory<F> = Box<dyn Fn() -> F + Send + Sync>;

/// A filter slot rebuilt every `interval`.
pub struct WindowedFilter<F: ProbabilisticFilter> {
    current: ArcSwap<F>,
    factory: FilterFactory<F>,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    interval_nanos: u64,
    last_rebuild_nanos: AtomicU64,
    sub_windows: u32,
    sub_window: AtomicU32,
    metrics: Metrics,
}

impl<F: ProbabilisticFilter> WindowedFilter<F> {
    /// Create a windowed filter cycling through `sub_windows` slots of `interval` each.
    ///
    /// The first instance is built immediately and the rebuild clock starts now.
    pub fn new(
        interval: Duration,
        sub_windows: u32,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        factory: impl Fn() -> F + Send + Sync + 'static,
    ) -> Self {
        let epoch = clock.now();
        Self {
            current: ArcSwap::from_pointee(factory()),
            factory: Box::new(factory),
            clock,
            epoch,
            interval_nanos: u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX),
            last_rebuild_nanos: AtomicU64::new(0),
            sub_windows: sub_windows.max(1),
            sub_window: AtomicU32::new(0),
            metrics,
        }
    }

    /// Zero-based index of the active sub-window.
    pub fn sub_window(&self) -> u32 {
        self.sub_window.load(Ordering::Acquire)
    }

    pub fn sub_windows(&self) -> u32 {
        self.sub_windows
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos)
    }

    fn elapsed_nanos(&self) -> u64 {
        let elapsed = self.clock.now().saturating_duration_since(self.epoch);
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }

    /// The filter instance to use for this query, rebuilding first if the
    /// current interval is over.
    pub fn current(&self) -> Arc<F> {
        let last = self.last_rebuild_nanos.load(Ordering::Acquire);
        let now = self.elapsed_nanos();
        if now.saturating_sub(last) < self.interval_nanos {
            return self.current.load_full();
        }

        if self
            .last_rebuild_nanos
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let next = (self.sub_window.load(Ordering::Acquire) + 1) % self.sub_windows;
            self.current.store(Arc::new((self.factory)()));
            self.sub_window.store(next, Ordering::Release);
            self.metrics.record_rotation();
            tracing::trace!(sub_window = next, sub_windows = self.sub_windows, "rebuilt stack filter");
        }
        self.current.load_full()
    }

    /// Record a signature in the current instance.
    pub fn insert(&self, signature: &StackSignature) -> bool {
        self.current().insert(signature)
    }

    pub fn might_contain(&self, signature: &StackSignature) -> bool {
        self.current().might_contain(signature)
    }
}

impl<F: ProbabilisticFilter> fmt::Debug for WindowedFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowedFilter")
            .field("interval", &self.interval())
            .field("sub_windows", &self.sub_windows)
            .field("sub_window", &self.sub_window())
            .field("current", &"<filter>")
            .finish()
    }
}

/// Existence window: a signature is "full" once it was already seen in the window.
#[derive(Debug)]
pub struct ExistenceWindow {
    filter: WindowedFilter<BloomFilter>,
}

impl ExistenceWindow {
    pub fn new(window: Duration, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        let capacity = capacity_for(window);
        Self {
            filter: WindowedFilter::new(window, 1, clock, metrics, move || {
                BloomFilter::with_capacity(capacity)
            }),
        }
    }

    /// Insert `signature`; `true` when it was already present in this window.
    pub fn is_full(&self, signature: &StackSignature) -> bool {
        !self.filter.insert(signature)
    }

    pub fn inner(&self) -> &WindowedFilter<BloomFilter> {
        &self.filter
    }
}

/// How a window budget is split across counting sub-windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubWindowPlan {
    /// Number of sub-windows, `ceil(budget / MAX_COUNT)`.
    pub count: u32,
    /// Occurrences permitted in the last sub-window.
    pub last_limit: u8,
    /// Length of each sub-window.
    pub interval: Duration,
}

impl SubWindowPlan {
    /// Split `budget` occurrences over `window`. `budget` must be non-zero.
    pub fn new(budget: u32, window: Duration) -> Self {
        let ceiling = u32::from(MAX_COUNT);
        let remainder = budget % ceiling;
        let count = (budget / ceiling + u32::from(remainder != 0)).max(1);
        let last_limit = if remainder == 0 { MAX_COUNT } else { remainder as u8 };
        Self {
            count,
            last_limit,
            interval: window / count,
        }
    }

    /// Occurrences permitted in sub-window `index` (zero-based).
    pub fn limit_for(&self, index: u32) -> u8 {
        if index + 1 >= self.count {
            self.last_limit
        } else {
            MAX_COUNT
        }
    }
}

/// Counting window: a signature is "full" once it reached the permitted count
/// of the active sub-window.
#[derive(Debug)]
pub struct CountingWindow {
    filter: WindowedFilter<CountingFilter>,
    plan: SubWindowPlan,
}

impl CountingWindow {
    pub fn new(budget: u32, window: Duration, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        let plan = SubWindowPlan::new(budget, window);
        let capacity = capacity_for(window);
        Self {
            filter: WindowedFilter::new(plan.interval, plan.count, clock, metrics, move || {
                CountingFilter::with_capacity(capacity)
            }),
            plan,
        }
    }

    pub fn plan(&self) -> SubWindowPlan {
        self.plan
    }

    pub fn insert(&self, signature: &StackSignature) -> bool {
        self.filter.insert(signature)
    }

    pub fn might_contain(&self, signature: &StackSignature) -> bool {
        self.filter.might_contain(signature)
    }

    /// Count one more occurrence; `true` once the sub-window limit is reached.
    pub fn is_full(&self, signature: &StackSignature) -> bool {
        let filter = self.filter.current();
        let limit = self.plan.limit_for(self.filter.sub_window());
        !filter.insert(signature) || filter.approximate_count(signature) >= limit
    }

    pub fn inner(&self) -> &WindowedFilter<CountingFilter> {
        &self.filter
    }
}
