//! # stack-throttle
//!
//! Stack trace noise reduction for high-volume logs.
//!
//! During an incident the same exception can be logged thousands of times per
//! second. This crate keeps such logs readable in two ways:
//!
//! - **Line skipping**: frames matching a configured predicate (framework
//!   internals, proxies, reflection) are left out of the printed stack, and the
//!   next printed frame says how many were skipped.
//! - **Temporal deduplication**: an exception whose stack was already printed
//!   often enough in the current time window gets line skipping switched on,
//!   so only the first occurrences carry the full diagnostic text.
//!
//! ## Quick Start
//!
//! ```rust
//! use stack_throttle::{
//!     ExceptionProxy, LogEvent, MapPropertySource, NoiselessConfig, PredicateFactory,
//!     RenderOptions, StackTraceRenderer,
//! };
//!
//! let properties = MapPropertySource::new()
//!     .with("logback.stackTrace.skipLine", "org.springframework.,sun.reflect.")
//!     .with("logback.stackTrace.maxNumPerCycle", "1")
//!     .with("logback.stackTrace.cycleDuration", "1m");
//!
//! let config = NoiselessConfig::load(&properties, &PredicateFactory::new());
//! let renderer = StackTraceRenderer::from_config(RenderOptions::new(), config.as_ref());
//!
//! let frames = [
//!     "com.acme.Repo.load(Repo.java:42)",
//!     "org.springframework.aop.Proxy.invoke(Proxy.java:99)",
//!     "com.acme.Api.get(Api.java:7)",
//! ];
//! let first = ExceptionProxy::builder("java.lang.IllegalStateException").frames(frames).build();
//! let second = ExceptionProxy::builder("java.lang.IllegalStateException").frames(frames).build();
//!
//! // First occurrence in the window: printed in full.
//! let text = renderer.render(&LogEvent::new("ERROR", "api", "failed").with_exception(first));
//! assert!(text.contains("org.springframework"));
//!
//! // Same stack again within a minute: framework frames are skipped.
//! let text = renderer.render(&LogEvent::new("ERROR", "api", "failed").with_exception(second));
//! assert!(!text.contains("org.springframework"));
//! assert!(text.contains("[1 skipped]"));
//! ```
//!
//! ## Configuration
//!
//! | Key | Effect |
//! |---|---|
//! | `logback.stackTrace.skipLine` | Predicate definition; absent or blank disables the feature |
//! | `logback.stackTrace.skipLineMode` | `allow-list`, `deny-list` (default), `external-instance`, `compiled-expression` |
//! | `logback.stackTrace.maxNumPerCycle` | Full-stack prints per window; `<= 0` disables throttling |
//! | `logback.stackTrace.cycleDuration` | Window length (`500`, `90s`, `10m`, `PT1H`); required with a budget |
//!
//! Keys are read from any [`PropertySource`](application::ports::PropertySource):
//! an explicit [`MapPropertySource`], the environment via [`EnvPropertySource`]
//! (`LOGBACK_STACKTRACE_SKIPLINE`, ...), or a [`LayeredPropertySource`] chaining
//! several. [`LazyConfig`] resolves once, after the host marks itself ready.
//!
//! ### Skip line modes
//!
//! - **Allow-list**: comma-separated prefixes; frames outside them are skipped.
//! - **Deny-list**: comma-separated prefixes; frames inside them are skipped.
//! - **External instance**: a predicate registered on [`PredicateFactory`] by name.
//! - **Compiled expression**: a boolean expression over `line`, for example
//!   `line.contains("$$Lambda") || line.startsWith("at sun.reflect.")`.
//!
//! ## Throttling
//!
//! A budget of 1 tracks stacks in a Bloom filter rebuilt every window. Larger
//! budgets use a counting filter whose per-item ceiling is 7, so the window is
//! split into `ceil(budget / 7)` sub-windows of 7 prints each, the last one
//! taking the remainder. Filters are rebuilt lazily and lock-free: the first
//! query past a boundary swaps in an empty filter, everyone else keeps going.
//!
//! Each exception occurrence is decided once. Rendering the same event for
//! several sinks hits the [`DecisionCache`] instead of counting again.
//!
//! ## Observability
//!
//! ```rust
//! # use stack_throttle::{MapPropertySource, NoiselessConfig, PredicateFactory};
//! # let properties = MapPropertySource::new().with("logback.stackTrace.skipLine", "sun.");
//! # let config = NoiselessConfig::load(&properties, &PredicateFactory::new()).unwrap();
//! let snapshot = config.metrics().snapshot();
//! println!("Suppression rate: {:.2}%", snapshot.suppression_rate() * 100.0);
//! println!("Filter rotations: {}", snapshot.filter_rotations);
//! ```
//!
//! Diagnostics go through `tracing`: configuration errors at `error`, the first
//! predicate failure at `warn`, filter rotations at `trace`.
//!
//! ## Fail-Safe Operation
//!
//! Nothing here drops log output. Invalid configuration disables the feature
//! and stacks print unfiltered. A predicate that panics is switched off for the
//! rest of the process and the renderer falls back to its deny substrings.

// Domain layer - pure logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    duration::{parse_duration, DurationParseError},
    event::LogEvent,
    exception::{ExceptionProxy, ExceptionProxyBuilder, OccurrenceId, PackagingData, StackFrame},
    expression::{ExpressionError, LineExpression},
    filter::{BloomFilter, CountingFilter, ProbabilisticFilter},
    mode::{SkipLineMode, UnknownModeError},
    predicate::{AllowListPredicate, DenyListPredicate, FnPredicate, LineSkipPredicate},
    signature::StackSignature,
};

pub use application::{
    config::{ConfigError, LazyConfig, NoiselessConfig},
    duplicate::{DuplicateDecisionFilter, DuplicateDecisionFilterBuilder, FilterError},
    factory::{LineExpressionCompiler, PredicateFactory},
    guard::PredicateGuard,
    metrics::{Metrics, MetricsSnapshot},
    ports::{EvaluationError, EventEvaluator, ExpressionCompiler, SharedPredicate},
    window::{CountingWindow, ExistenceWindow, SubWindowPlan, WindowedFilter},
};

pub use infrastructure::{
    cache::DecisionCache,
    clock::SystemClock,
    properties::{EnvPropertySource, LayeredPropertySource, MapPropertySource},
    renderer::{EvaluatorRegistry, LengthOption, RenderOptions, StackTraceRenderer},
};
