//! Configuration resolution.
//!
//! Reads the `logback.stackTrace.*` keys from a [`PropertySource`], builds the
//! line skip predicate and, when a budget is configured, wraps it in a
//! [`DuplicateDecisionFilter`]. Configuration errors disable the feature as a
//! whole; [`NoiselessConfig::load`] reports them once and returns `None`, so
//! the renderer prints stacks unfiltered.

use crate::application::duplicate::{DuplicateDecisionFilter, FilterError};
use crate::application::factory::PredicateFactory;
use crate::application::guard::PredicateGuard;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, PropertySource, SharedPredicate};
use crate::domain::duration::{parse_duration, DurationParseError};
use crate::domain::mode::{SkipLineMode, UnknownModeError};
use crate::infrastructure::clock::SystemClock;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Predicate definition; its meaning depends on the mode.
pub const SKIP_LINE_KEY: &str = "logback.stackTrace.skipLine";
/// One of the [`SkipLineMode`] names. Default: deny-list.
pub const SKIP_LINE_MODE_KEY: &str = "logback.stackTrace.skipLineMode";
/// Full-stack prints permitted per window; `<= 0` disables throttling.
pub const MAX_NUM_PER_CYCLE_KEY: &str = "logback.stackTrace.maxNumPerCycle";
/// Window duration; required when the budget is positive.
pub const CYCLE_DURATION_KEY: &str = "logback.stackTrace.cycleDuration";

/// Error raised while resolving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid logback.stackTrace.skipLineMode: {0}")]
    InvalidMode(#[from] UnknownModeError),

    #[error("invalid logback.stackTrace.maxNumPerCycle '{0}': expected an integer")]
    InvalidBudget(String),

    #[error("invalid logback.stackTrace.cycleDuration '{value}': {source}")]
    InvalidDuration {
        value: String,
        source: DurationParseError,
    },

    #[error("logback.stackTrace.cycleDuration is required when logback.stackTrace.maxNumPerCycle is greater than 0")]
    MissingDuration,

    #[error("no line skip predicate registered under '{0}'")]
    UnknownInstance(String),

    #[error("no expression compiler registered")]
    NoCompiler,

    #[error("expression compiler '{0}' is not registered")]
    UnknownCompiler(String),

    #[error("failed to compile skip line expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("invalid throttling settings: {0}")]
    Filter(#[from] FilterError),
}

/// Resolved configuration.
#[derive(Clone)]
pub struct NoiselessConfig {
    mode: SkipLineMode,
    skip_line: String,
    predicate: SharedPredicate,
    guard: Arc<PredicateGuard>,
    max_num_per_cycle: u32,
    cycle_duration: Option<Duration>,
    metrics: Metrics,
}

impl NoiselessConfig {
    /// Resolve from `source`, using the system clock for throttling windows.
    ///
    /// `Ok(None)` when `skipLine` is absent or blank.
    pub fn resolve(
        source: &dyn PropertySource,
        factory: &PredicateFactory,
    ) -> Result<Option<Self>, ConfigError> {
        Self::resolve_with(source, factory, Arc::new(SystemClock::new()), Metrics::new())
    }

    /// Resolve with an explicit clock and metrics handle.
    pub fn resolve_with(
        source: &dyn PropertySource,
        factory: &PredicateFactory,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Result<Option<Self>, ConfigError> {
        let skip_line = match source.property(SKIP_LINE_KEY) {
            Some(value) if !value.trim().is_empty() => value,
            _ => return Ok(None),
        };

        let mode = match source.property(SKIP_LINE_MODE_KEY) {
            Some(value) if !value.trim().is_empty() => value.parse::<SkipLineMode>()?,
            _ => SkipLineMode::default(),
        };

        let predicate = factory.build(mode, &skip_line)?;

        let max_num_per_cycle = parse_budget(source.property(MAX_NUM_PER_CYCLE_KEY))?;
        let (predicate, cycle_duration) = if max_num_per_cycle > 0 {
            let raw = source
                .property(CYCLE_DURATION_KEY)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingDuration)?;
            let window = parse_duration(&raw).map_err(|source| ConfigError::InvalidDuration {
                value: raw.clone(),
                source,
            })?;

            let filter = DuplicateDecisionFilter::builder(window)
                .with_budget(max_num_per_cycle)
                .with_clock(clock)
                .with_metrics(metrics.clone())
                .build(predicate)?;
            (Arc::new(filter) as SharedPredicate, Some(window))
        } else {
            (predicate, None)
        };

        tracing::debug!(
            target: "stack_throttle::config",
            %mode,
            max_num_per_cycle,
            cycle_duration = ?cycle_duration,
            "resolved stack trace filtering"
        );

        let guard = Arc::new(PredicateGuard::new(Arc::clone(&predicate), metrics.clone()));

        Ok(Some(Self {
            mode,
            skip_line,
            predicate,
            guard,
            max_num_per_cycle,
            cycle_duration,
            metrics,
        }))
    }

    /// Like [`resolve`](Self::resolve), but reports errors once and returns
    /// `None` so callers fall back to unfiltered printing.
    pub fn load(source: &dyn PropertySource, factory: &PredicateFactory) -> Option<Self> {
        Self::resolve(source, factory).unwrap_or_else(|e| {
            report(&e);
            None
        })
    }

    pub fn mode(&self) -> SkipLineMode {
        self.mode
    }

    /// The raw `skipLine` property.
    pub fn skip_line(&self) -> &str {
        &self.skip_line
    }

    /// The active predicate, throttled when a budget is configured.
    pub fn predicate(&self) -> &SharedPredicate {
        &self.predicate
    }

    /// Fail-safe shared by every renderer built from this configuration.
    ///
    /// Once the predicate fails it stays disabled for all of them.
    pub fn guard(&self) -> &Arc<PredicateGuard> {
        &self.guard
    }

    pub fn max_num_per_cycle(&self) -> u32 {
        self.max_num_per_cycle
    }

    pub fn cycle_duration(&self) -> Option<Duration> {
        self.cycle_duration
    }

    pub fn is_throttled(&self) -> bool {
        self.max_num_per_cycle > 0
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl fmt::Debug for NoiselessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiselessConfig")
            .field("mode", &self.mode)
            .field("skip_line", &self.skip_line)
            .field("max_num_per_cycle", &self.max_num_per_cycle)
            .field("cycle_duration", &self.cycle_duration)
            .finish_non_exhaustive()
    }
}

fn parse_budget(value: Option<String>) -> Result<u32, ConfigError> {
    let Some(raw) = value else {
        return Ok(0);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let budget: i64 = trimmed
        .parse()
        .map_err(|_| ConfigError::InvalidBudget(raw.clone()))?;
    if budget <= 0 {
        return Ok(0);
    }
    u32::try_from(budget).map_err(|_| ConfigError::InvalidBudget(raw))
}

fn report(error: &ConfigError) {
    tracing::error!(
        target: "stack_throttle::config",
        error = %error,
        "stack trace filtering disabled by invalid configuration"
    );
}

/// Configuration resolved once, on first use after the host signals readiness.
///
/// Until [`mark_ready`](Self::mark_ready) is called, [`get`](Self::get)
/// returns `None` without touching the property source.
pub struct LazyConfig {
    source: Arc<dyn PropertySource>,
    factory: PredicateFactory,
    ready: AtomicBool,
    resolved: OnceCell<Option<Arc<NoiselessConfig>>>,
}

impl LazyConfig {
    pub fn new(source: Arc<dyn PropertySource>, factory: PredicateFactory) -> Self {
        Self {
            source,
            factory,
            ready: AtomicBool::new(false),
            resolved: OnceCell::new(),
        }
    }

    /// Allow resolution from now on.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether resolution already ran.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The resolved configuration, resolving it on the first ready call.
    pub fn get(&self) -> Option<Arc<NoiselessConfig>> {
        if !self.is_ready() {
            return None;
        }
        self.resolved
            .get_or_init(|| NoiselessConfig::load(self.source.as_ref(), &self.factory).map(Arc::new))
            .clone()
    }
}

impl fmt::Debug for LazyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyConfig")
            .field("ready", &self.is_ready())
            .field("resolved", &self.resolved.get())
            .finish()
    }
}
