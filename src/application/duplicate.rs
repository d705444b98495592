//! Duplicate decision filter.
//!
//! Decides, once per exception occurrence, whether the stack of that
//! occurrence should have line skipping enabled because the same stack was
//! already printed often enough in the current window. Per-line decisions are
//! delegated to the wrapped predicate.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, DecisionStore, SharedPredicate};
use crate::application::window::{CountingWindow, ExistenceWindow};
use crate::domain::exception::ExceptionProxy;
use crate::domain::predicate::LineSkipPredicate;
use crate::domain::signature::StackSignature;
use crate::infrastructure::cache::DecisionCache;
use crate::infrastructure::clock::SystemClock;
use std::sync::Arc;
use std::time::Duration;

/// Error returned when a duplicate filter is misconfigured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// The occurrence budget must be at least one
    #[error("occurrence budget must be greater than 0")]
    ZeroBudget,
    /// The window must be longer than zero
    #[error("window duration must be greater than 0")]
    ZeroWindow,
    /// The budget must be below the window length in milliseconds
    #[error("occurrence budget {budget} must be less than the window length in milliseconds ({window_millis})")]
    BudgetExceedsWindow { budget: u32, window_millis: u128 },
}

#[derive(Debug)]
enum Window {
    Existence(ExistenceWindow),
    Counting(CountingWindow),
}

impl Window {
    fn is_duplicate(&self, exception: &ExceptionProxy) -> bool {
        match self {
            Window::Existence(window) => window.is_full(&StackSignature::full(exception.frames())),
            Window::Counting(window) => {
                // The throw site is a cheap pre-filter: an unseen head means an
                // unseen stack, so record the head and print in full.
                let head = StackSignature::head(exception.frames());
                if !window.might_contain(&head) {
                    window.insert(&head);
                    return false;
                }
                window.is_full(&StackSignature::full(exception.frames()))
            }
        }
    }
}

/// Throttles full-stack printing for exceptions that recur within a window.
///
/// A budget of 1 uses an existence window (a stack prints in full once per
/// window); a larger budget uses counting sub-windows.
///
/// # Example
/// ```
/// use stack_throttle::{DenyListPredicate, DuplicateDecisionFilter, ExceptionProxy, LineSkipPredicate};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let filter = DuplicateDecisionFilter::builder(Duration::from_secs(60))
///     .with_budget(1)
///     .build(Arc::new(DenyListPredicate::parse("org.springframework.")))
///     .unwrap();
///
/// let first = ExceptionProxy::builder("IllegalStateException")
///     .frames(["com.acme.Service.run(Service.java:10)"])
///     .build();
/// let again = ExceptionProxy::builder("IllegalStateException")
///     .frames(["com.acme.Service.run(Service.java:10)"])
///     .build();
///
/// assert!(!filter.should_enable_skip(&first));
/// assert!(filter.should_enable_skip(&again));
/// // Repeated sink calls for one occurrence get the same answer.
/// assert!(!filter.should_enable_skip(&first));
/// ```
#[derive(Debug)]
pub struct DuplicateDecisionFilter {
    window: Window,
    cache: Arc<dyn DecisionStore>,
    delegate: SharedPredicate,
    metrics: Metrics,
}

impl DuplicateDecisionFilter {
    /// Start building a filter over `window`.
    pub fn builder(window: Duration) -> DuplicateDecisionFilterBuilder {
        DuplicateDecisionFilterBuilder {
            window,
            budget: 1,
            clock: None,
            cache: None,
            metrics: None,
        }
    }

    /// Whether this filter counts occurrences (budget above one).
    pub fn is_counting(&self) -> bool {
        matches!(self.window, Window::Counting(_))
    }

    /// Number of memoized decisions.
    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn delegate(&self) -> &SharedPredicate {
        &self.delegate
    }
}

impl LineSkipPredicate for DuplicateDecisionFilter {
    fn should_enable_skip(&self, exception: &ExceptionProxy) -> bool {
        let lookup = self
            .cache
            .get_or_compute(exception.id(), &mut || self.window.is_duplicate(exception));

        if lookup.hit {
            self.metrics.record_cache_hit();
        } else if lookup.value {
            self.metrics.record_suppressed_stack();
        } else {
            self.metrics.record_full_stack();
        }
        lookup.value
    }

    fn should_skip_line(&self, line: &str) -> bool {
        self.delegate.should_skip_line(line)
    }
}

/// Builder for [`DuplicateDecisionFilter`].
#[derive(Debug)]
pub struct DuplicateDecisionFilterBuilder {
    window: Duration,
    budget: u32,
    clock: Option<Arc<dyn Clock>>,
    cache: Option<Arc<dyn DecisionStore>>,
    metrics: Option<Metrics>,
}

impl DuplicateDecisionFilterBuilder {
    /// Full-stack prints permitted per window. Default: 1.
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a specific decision store instead of a fresh [`DecisionCache`].
    pub fn with_cache(mut self, cache: Arc<dyn DecisionStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the settings and build the filter around `delegate`.
    pub fn build(self, delegate: SharedPredicate) -> Result<DuplicateDecisionFilter, FilterError> {
        if self.budget == 0 {
            return Err(FilterError::ZeroBudget);
        }
        if self.window.is_zero() {
            return Err(FilterError::ZeroWindow);
        }
        let window_millis = self.window.as_millis();
        if u128::from(self.budget) >= window_millis {
            return Err(FilterError::BudgetExceedsWindow {
                budget: self.budget,
                window_millis,
            });
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = self.metrics.unwrap_or_default();
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(DecisionCache::new()));

        let window = if self.budget == 1 {
            Window::Existence(ExistenceWindow::new(self.window, clock, metrics.clone()))
        } else {
            Window::Counting(CountingWindow::new(
                self.budget,
                self.window,
                clock,
                metrics.clone(),
            ))
        };

        Ok(DuplicateDecisionFilter {
            window,
            cache,
            delegate,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::predicate::DenyListPredicate;
    use crate::infrastructure::mocks::MockClock;
    use std::time::Instant;

    fn stack(frames: &[&str]) -> ExceptionProxy {
        ExceptionProxy::builder("java.lang.RuntimeException")
            .message("boom")
            .frames(frames.iter().copied())
            .build()
    }

    fn delegate() -> SharedPredicate {
        Arc::new(DenyListPredicate::parse("com.foo."))
    }

    fn filter(budget: u32, window: Duration, clock: Arc<MockClock>) -> DuplicateDecisionFilter {
        DuplicateDecisionFilter::builder(window)
            .with_budget(budget)
            .with_clock(clock)
            .build(delegate())
            .unwrap()
    }

    const FRAMES: &[&str] = &[
        "com.acme.Repo.load(Repo.java:10)",
        "com.acme.Service.get(Service.java:20)",
        "com.acme.Controller.handle(Controller.java:30)",
        "com.foo.Proxy.invoke(Proxy.java:40)",
    ];

    #[test]
    fn test_validation() {
        let build = |budget, window| {
            DuplicateDecisionFilter::builder(window)
                .with_budget(budget)
                .build(delegate())
                .map(|_| ())
        };

        assert_eq!(build(0, Duration::from_secs(60)), Err(FilterError::ZeroBudget));
        assert_eq!(build(1, Duration::ZERO), Err(FilterError::ZeroWindow));
        assert_eq!(
            build(100, Duration::from_millis(100)),
            Err(FilterError::BudgetExceedsWindow {
                budget: 100,
                window_millis: 100
            })
        );
        assert_eq!(build(99, Duration::from_millis(100)), Ok(()));
    }

    #[test]
    fn test_variant_selection() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        assert!(!filter(1, Duration::from_secs(60), clock.clone()).is_counting());
        assert!(filter(2, Duration::from_secs(60), clock).is_counting());
    }

    #[test]
    fn test_existence_second_occurrence_suppressed() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(1, Duration::from_secs(60), clock.clone());

        assert!(!filter.should_enable_skip(&stack(FRAMES)));
        clock.advance(Duration::from_secs(10));
        assert!(filter.should_enable_skip(&stack(FRAMES)));
    }

    #[test]
    fn test_decision_is_memoized_per_occurrence() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(1, Duration::from_secs(60), clock);
        let first = stack(FRAMES);
        let second = stack(FRAMES);

        assert!(!filter.should_enable_skip(&first));
        assert!(filter.should_enable_skip(&second));
        for _ in 0..5 {
            assert!(!filter.should_enable_skip(&first));
            assert!(filter.should_enable_skip(&second.clone()));
        }
        assert_eq!(filter.cached_decisions(), 2);
        assert_eq!(filter.metrics().cache_hits(), 10);
        assert_eq!(filter.metrics().full_stacks(), 1);
        assert_eq!(filter.metrics().suppressed_stacks(), 1);
    }

    #[test]
    fn test_counting_budget_within_one_sub_window() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(5, Duration::from_secs(60), clock);

        let decisions: Vec<bool> = (0..8).map(|_| filter.should_enable_skip(&stack(FRAMES))).collect();
        assert_eq!(
            decisions,
            vec![false, false, false, false, false, true, true, true]
        );
    }

    #[test]
    fn test_counting_short_stack_gets_full_budget() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(5, Duration::from_secs(60), clock);

        // One frame: the head covers the whole stack but is recorded separately.
        let short = ["com.acme.Worker.run(Worker.java:7)"];
        let decisions: Vec<bool> = (0..10).map(|_| filter.should_enable_skip(&stack(&short))).collect();
        assert_eq!(decisions.iter().filter(|s| !**s).count(), 5);
        assert_eq!(&decisions[..6], &[false, false, false, false, false, true]);
    }

    #[test]
    fn test_counting_head_prefilter() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(2, Duration::from_secs(60), clock);

        // Same throw site, different tails: the second goes through the full check.
        assert!(!filter.should_enable_skip(&stack(FRAMES)));
        assert!(!filter.should_enable_skip(&stack(&[FRAMES[0], FRAMES[1], FRAMES[2], "x.Y.z(Y.java:1)"])));
        assert!(!filter.should_enable_skip(&stack(FRAMES)));
        assert!(filter.should_enable_skip(&stack(FRAMES)));
    }

    #[test]
    fn test_counting_budget_spans_sub_windows() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(10, Duration::from_secs(60), clock.clone());

        let first: Vec<bool> = (0..9).map(|_| filter.should_enable_skip(&stack(FRAMES))).collect();
        assert_eq!(first.iter().filter(|s| !**s).count(), 7);
        assert!(first[7] && first[8]);

        clock.advance(Duration::from_secs(30));
        let second: Vec<bool> = (0..5).map(|_| filter.should_enable_skip(&stack(FRAMES))).collect();
        assert_eq!(second, vec![false, false, false, true, true]);
    }

    #[test]
    fn test_line_decisions_delegate() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let filter = filter(1, Duration::from_secs(60), clock);

        assert!(filter.should_skip_line("at com.foo.Proxy.invoke(Proxy.java:40)"));
        assert!(!filter.should_skip_line("at com.acme.Repo.load(Repo.java:10)"));
    }
}
