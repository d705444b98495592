//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters and the embedding application
//! implement these ports.

use crate::domain::event::LogEvent;
use crate::domain::exception::OccurrenceId;
use crate::domain::predicate::LineSkipPredicate;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

/// Port for obtaining current time.
///
/// Window rotation only compares instants taken from this clock, so tests can
/// drive rotation deterministically with `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for reading configuration properties by key.
///
/// Keys are the dotted names listed in [`crate::application::config`], such as
/// `logback.stackTrace.skipLine`.
pub trait PropertySource: Send + Sync + Debug {
    /// Look up a property. `None` when the key is not set.
    fn property(&self, key: &str) -> Option<String>;
}

impl<P: PropertySource + ?Sized> PropertySource for Arc<P> {
    fn property(&self, key: &str) -> Option<String> {
        (**self).property(key)
    }
}

/// Shared, type-erased line predicate.
pub type SharedPredicate = Arc<dyn LineSkipPredicate>;

/// Port for turning an expression string into a line predicate.
pub trait ExpressionCompiler: Send + Sync + Debug {
    /// Compile `source` into a predicate over the rendered line.
    ///
    /// Errors are reported as plain messages; they are fatal for the feature.
    fn compile(&self, source: &str) -> Result<SharedPredicate, String>;
}

/// Error raised by an [`EventEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("evaluation failed: {0}")]
pub struct EvaluationError(pub String);

/// Named condition that, when it matches, suppresses the whole stack trace of an event.
pub trait EventEvaluator: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// `Ok(true)` suppresses the stack trace for this event.
    fn evaluate(&self, event: &LogEvent) -> Result<bool, EvaluationError>;
}

/// Result of a decision cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLookup {
    /// The decision, cached or freshly computed.
    pub value: bool,
    /// `true` when the value came from the cache.
    pub hit: bool,
}

/// Port for memoizing per-occurrence duplicate decisions.
///
/// Implementations must make compute-if-absent atomic per key: concurrent
/// first lookups for the same occurrence may compute more than once, but all
/// of them observe the same stored value.
pub trait DecisionStore: Send + Sync + Debug {
    /// Return the cached decision for `id`, computing and storing it on a miss.
    fn get_or_compute(&self, id: OccurrenceId, compute: &mut dyn FnMut() -> bool) -> CacheLookup;

    /// Number of cached decisions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached decision.
    fn clear(&self);
}
