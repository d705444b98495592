//! Fail-safe wrapper around a line skip predicate.
//!
//! Predicates may come from the embedding application, so any call into them
//! can panic. The first panic trips the guard for the rest of its lifetime:
//! the predicate is never called again and callers fall back to their own
//! default line policy. The diagnostic is emitted once, at the first failure.

use crate::application::metrics::Metrics;
use crate::application::ports::SharedPredicate;
use crate::domain::exception::ExceptionProxy;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sticky fail-safe around a [`SharedPredicate`].
///
/// `None` from [`enable_skip`](Self::enable_skip) or
/// [`skip_line`](Self::skip_line) means the guard is tripped and the caller
/// should use its fallback behaviour.
#[derive(Debug)]
pub struct PredicateGuard {
    predicate: SharedPredicate,
    failed: AtomicBool,
    metrics: Metrics,
}

impl PredicateGuard {
    pub fn new(predicate: SharedPredicate, metrics: Metrics) -> Self {
        Self {
            predicate,
            failed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Whether a predicate call has failed.
    pub fn is_tripped(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn predicate(&self) -> &SharedPredicate {
        &self.predicate
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Ask the predicate whether skipping applies to `exception`.
    pub fn enable_skip(&self, exception: &ExceptionProxy) -> Option<bool> {
        self.call("should_enable_skip", || self.predicate.should_enable_skip(exception))
    }

    /// Ask the predicate whether `line` should be omitted.
    pub fn skip_line(&self, line: &str) -> Option<bool> {
        self.call("should_skip_line", || self.predicate.should_skip_line(line))
    }

    fn call(&self, operation: &'static str, f: impl FnOnce() -> bool) -> Option<bool> {
        if self.is_tripped() {
            return None;
        }

        match panic::catch_unwind(panic::AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.metrics.record_predicate_failure();
                // Only the thread that flips the flag reports.
                if !self.failed.swap(true, Ordering::AcqRel) {
                    tracing::warn!(
                        operation,
                        predicate = ?self.predicate,
                        cause = panic_message(payload.as_ref()),
                        "line skip predicate failed, falling back to default stack trace filtering"
                    );
                }
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::predicate::{DenyListPredicate, FnPredicate};
    use crate::infrastructure::mocks::MockCaptureLayer;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_passes_through_while_healthy() {
        let guard = PredicateGuard::new(Arc::new(DenyListPredicate::parse("com.foo.")), Metrics::new());
        let exception = ExceptionProxy::builder("E").build();

        assert_eq!(guard.enable_skip(&exception), Some(true));
        assert_eq!(guard.skip_line("at com.foo.A.b(A.java:1)"), Some(true));
        assert_eq!(guard.skip_line("at com.bar.A.b(A.java:1)"), Some(false));
        assert!(!guard.is_tripped());
    }

    #[test]
    fn test_first_panic_trips_permanently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let predicate = FnPredicate::new("exploding", move |line: &str| {
            counted.fetch_add(1, Ordering::SeqCst);
            if line.contains("boom") {
                panic!("predicate blew up");
            }
            false
        });
        let metrics = Metrics::new();
        let guard = PredicateGuard::new(Arc::new(predicate), metrics.clone());

        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(guard.skip_line("at ok"), Some(false));
            assert_eq!(guard.skip_line("at boom"), None);
            assert_eq!(guard.skip_line("at ok"), None);
            assert_eq!(guard.skip_line("at boom"), None);
        });

        assert!(guard.is_tripped());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.predicate_failures(), 1);

        let warnings: Vec<_> = capture
            .get_captured()
            .into_iter()
            .filter(|e| e.level == Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("falling back"));
    }

    #[test]
    fn test_enable_check_failure_trips_line_checks() {
        #[derive(Debug)]
        struct FailingEnable;

        impl crate::domain::predicate::LineSkipPredicate for FailingEnable {
            fn should_enable_skip(&self, _exception: &ExceptionProxy) -> bool {
                panic!("no decision")
            }

            fn should_skip_line(&self, _line: &str) -> bool {
                true
            }
        }

        let guard = PredicateGuard::new(Arc::new(FailingEnable), Metrics::new());
        let exception = ExceptionProxy::builder("E").build();

        assert_eq!(guard.enable_skip(&exception), None);
        assert_eq!(guard.skip_line("at a.B.c(B.java:1)"), None);
    }
}
