//! Stack trace rendering.
//!
//! Turns an [`ExceptionProxy`] tree into printable text. The renderer walks
//! the cause chain and the suppressed children, asks the active line skip
//! predicate which frame lines to omit, and annotates the next printed frame
//! with the number of lines omitted before it:
//!
//! ```text
//!
//! java.lang.IllegalStateException: boom
//! 	at com.acme.Service.run(Service.java:10) [2 skipped]
//! 	at com.acme.Main.main(Main.java:3)
//! Caused by: java.io.IOException: closed
//! 	at com.acme.Io.read(Io.java:7)
//! 	... 4 common frames omitted
//!
//! ```
//!
//! Whether skipping applies to an event is decided once, for the root
//! exception, and the same answer is used for every node of its tree.

use crate::application::config::NoiselessConfig;
use crate::application::guard::PredicateGuard;
use crate::application::metrics::Metrics;
use crate::application::ports::{EventEvaluator, SharedPredicate};
use crate::domain::event::LogEvent;
use crate::domain::exception::{ExceptionProxy, StackFrame};
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Evaluator errors reported per renderer; the last one says so.
pub const MAX_EVALUATOR_ERRORS: u32 = 4;

const CAUSED_BY: &str = "Caused by: ";
const SUPPRESSED: &str = "Suppressed: ";

/// Named evaluators known to the host, looked up by option token.
pub type EvaluatorRegistry = HashMap<String, Arc<dyn EventEvaluator>>;

/// How many frames to print per exception node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthOption {
    #[default]
    Full,
    Short,
    Frames(usize),
}

impl LengthOption {
    /// Parse a length token. `None` for anything other than `full`, `short`
    /// or a non-negative integer.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("full") {
            Some(LengthOption::Full)
        } else if token.eq_ignore_ascii_case("short") {
            Some(LengthOption::Short)
        } else {
            token.parse().ok().map(LengthOption::Frames)
        }
    }

    /// Frame limit, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            LengthOption::Full => None,
            LengthOption::Short => Some(1),
            LengthOption::Frames(n) => Some(*n),
        }
    }
}

/// Per-renderer options.
#[derive(Clone)]
pub struct RenderOptions {
    length: LengthOption,
    deny_substrings: Vec<String>,
    evaluators: Vec<Arc<dyn EventEvaluator>>,
    line_separator: String,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self {
            length: LengthOption::Full,
            deny_substrings: Vec::new(),
            evaluators: Vec::new(),
            line_separator: "\n".to_string(),
        }
    }

    /// Build from converter option tokens.
    ///
    /// The first token is the length option. Each remaining token names an
    /// evaluator if `registry` knows it, and is a deny substring otherwise.
    /// An invalid length token is reported and treated as `full`.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S], registry: &EvaluatorRegistry) -> Self {
        let mut options = Self::new();
        let Some((first, rest)) = tokens.split_first() else {
            return options;
        };

        let first = first.as_ref();
        options.length = LengthOption::parse(first).unwrap_or_else(|| {
            tracing::error!(
                target: "stack_throttle::renderer",
                token = first,
                "could not parse length option, printing full stack traces"
            );
            LengthOption::Full
        });

        for token in rest.iter().map(AsRef::as_ref) {
            match registry.get(token) {
                Some(evaluator) => options.evaluators.push(Arc::clone(evaluator)),
                None => options.deny_substrings.push(token.to_string()),
            }
        }
        options
    }

    pub fn with_length(mut self, length: LengthOption) -> Self {
        self.length = length;
        self
    }

    pub fn with_deny_substring(mut self, substring: impl Into<String>) -> Self {
        self.deny_substrings.push(substring.into());
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn EventEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    pub fn length(&self) -> LengthOption {
        self.length
    }

    pub fn deny_substrings(&self) -> &[String] {
        &self.deny_substrings
    }

    pub fn evaluators(&self) -> &[Arc<dyn EventEvaluator>] {
        &self.evaluators
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let evaluators: Vec<&str> = self.evaluators.iter().map(|e| e.name()).collect();
        f.debug_struct("RenderOptions")
            .field("length", &self.length)
            .field("deny_substrings", &self.deny_substrings)
            .field("evaluators", &evaluators)
            .field("line_separator", &self.line_separator)
            .finish()
    }
}

/// Renders exception trees with line skipping.
///
/// # Example
/// ```
/// use stack_throttle::{DenyListPredicate, ExceptionProxy, LogEvent, RenderOptions, StackTraceRenderer};
/// use std::sync::Arc;
///
/// let renderer = StackTraceRenderer::with_predicate(
///     RenderOptions::new(),
///     Arc::new(DenyListPredicate::parse("com.foo.")),
/// );
/// let exception = ExceptionProxy::builder("java.lang.RuntimeException")
///     .message("boom")
///     .frames(["com.foo.Proxy.invoke(Proxy.java:1)", "com.acme.Main.main(Main.java:2)"])
///     .build();
///
/// let text = renderer.render(&LogEvent::new("ERROR", "app", "failed").with_exception(exception));
/// assert_eq!(
///     text,
///     "\njava.lang.RuntimeException: boom\n\tat com.acme.Main.main(Main.java:2) [1 skipped]\n\n"
/// );
/// ```
#[derive(Debug)]
pub struct StackTraceRenderer {
    options: RenderOptions,
    guard: Option<Arc<PredicateGuard>>,
    evaluator_errors: AtomicU32,
    metrics: Metrics,
}

impl StackTraceRenderer {
    /// A renderer without a line skip predicate; only deny substrings apply.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            guard: None,
            evaluator_errors: AtomicU32::new(0),
            metrics: Metrics::new(),
        }
    }

    pub fn with_predicate(options: RenderOptions, predicate: SharedPredicate) -> Self {
        Self::with_predicate_and_metrics(options, predicate, Metrics::new())
    }

    pub fn with_predicate_and_metrics(
        options: RenderOptions,
        predicate: SharedPredicate,
        metrics: Metrics,
    ) -> Self {
        Self {
            options,
            guard: Some(Arc::new(PredicateGuard::new(predicate, metrics.clone()))),
            evaluator_errors: AtomicU32::new(0),
            metrics,
        }
    }

    /// A renderer that shares `guard` with other renderers, so a predicate
    /// failure seen by one disables the predicate for all.
    pub fn with_guard(options: RenderOptions, guard: Arc<PredicateGuard>) -> Self {
        let metrics = guard.metrics().clone();
        Self {
            options,
            guard: Some(guard),
            evaluator_errors: AtomicU32::new(0),
            metrics,
        }
    }

    /// Use the resolved configuration when there is one.
    pub fn from_config(options: RenderOptions, config: Option<&NoiselessConfig>) -> Self {
        match config {
            Some(config) => Self::with_guard(options, Arc::clone(config.guard())),
            None => Self::new(options),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Whether the wrapped predicate failed and was switched off.
    pub fn is_predicate_disabled(&self) -> bool {
        self.guard.as_ref().is_some_and(|guard| guard.is_tripped())
    }

    /// Render the exception of `event`.
    ///
    /// Empty when the event has no exception or an evaluator matches it.
    pub fn render(&self, event: &LogEvent) -> String {
        let Some(exception) = event.exception.as_ref() else {
            return String::new();
        };
        if self.suppressed_by_evaluator(event) {
            return String::new();
        }
        self.render_exception(exception)
    }

    /// Render an exception tree without consulting evaluators.
    pub fn render_exception(&self, exception: &ExceptionProxy) -> String {
        let enable_skip = self.enable_skip(exception);
        let separator = self.options.line_separator.as_str();

        let mut out = String::with_capacity(2048);
        out.push_str(separator);
        self.render_node(&mut out, None, 1, exception, enable_skip);
        out.push_str(separator);
        out
    }

    fn suppressed_by_evaluator(&self, event: &LogEvent) -> bool {
        for evaluator in &self.options.evaluators {
            match evaluator.evaluate(event) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(error) => self.report_evaluator_error(evaluator.name(), &error),
            }
        }
        false
    }

    fn report_evaluator_error(&self, name: &str, error: &dyn std::error::Error) {
        self.metrics.record_evaluator_error();
        let count = self.evaluator_errors.fetch_add(1, Ordering::Relaxed) + 1;
        if count < MAX_EVALUATOR_ERRORS {
            tracing::error!(
                target: "stack_throttle::renderer",
                evaluator = name,
                error = %error,
                "exception while evaluating stack trace evaluator"
            );
        } else if count == MAX_EVALUATOR_ERRORS {
            tracing::warn!(
                target: "stack_throttle::renderer",
                evaluator = name,
                error = %error,
                "exception while evaluating stack trace evaluator, this is the last warning"
            );
        }
    }

    fn enable_skip(&self, exception: &ExceptionProxy) -> bool {
        self.guard
            .as_ref()
            .and_then(|guard| guard.enable_skip(exception))
            .unwrap_or(true)
    }

    fn skip_line(&self, line: &str) -> bool {
        if let Some(skip) = self.guard.as_ref().and_then(|guard| guard.skip_line(line)) {
            return skip;
        }
        self.options
            .deny_substrings
            .iter()
            .any(|rule| line.contains(rule.as_str()))
    }

    fn render_node(
        &self,
        out: &mut String,
        prefix: Option<&str>,
        indent: usize,
        node: &ExceptionProxy,
        enable_skip: bool,
    ) {
        let separator = self.options.line_separator.as_str();

        push_tabs(out, indent - 1);
        if let Some(prefix) = prefix {
            out.push_str(prefix);
        }
        out.push_str(node.class_name());
        if let Some(message) = node.message() {
            out.push_str(": ");
            out.push_str(message);
        }
        out.push_str(separator);

        self.render_frames(out, indent, node, enable_skip);

        for suppressed in node.suppressed() {
            self.render_node(out, Some(SUPPRESSED), indent + 1, suppressed, enable_skip);
        }
        if let Some(cause) = node.cause() {
            self.render_node(out, Some(CAUSED_BY), indent, cause, enable_skip);
        }
    }

    fn render_frames(&self, out: &mut String, indent: usize, node: &ExceptionProxy, enable_skip: bool) {
        let separator = self.options.line_separator.as_str();
        let frames = node.frames();
        let common_frames = node.common_frames();

        let (mut max_index, elide_common) = match self.options.length.limit() {
            Some(limit) if limit < frames.len() => (limit, false),
            _ => (
                frames.len().saturating_sub(common_frames),
                common_frames > 0,
            ),
        };

        let mut skipped = 0usize;
        let mut i = 0;
        while i < max_index {
            let frame = &frames[i];
            i += 1;

            let line = frame.line();
            if enable_skip && self.skip_line(&line) {
                skipped += 1;
                if max_index < frames.len() {
                    max_index += 1;
                }
                continue;
            }

            push_tabs(out, indent);
            out.push_str(&line);
            push_packaging(out, frame);
            if skipped > 0 {
                push_skipped(out, skipped);
                skipped = 0;
            }
            out.push_str(separator);
        }

        if skipped > 0 {
            push_skipped(out, skipped);
            out.push_str(separator);
        }

        if elide_common {
            push_tabs(out, indent);
            let _ = write!(out, "... {} common frames omitted", common_frames);
            out.push_str(separator);
        }
    }
}

fn push_tabs(out: &mut String, count: usize) {
    out.extend(std::iter::repeat('\t').take(count));
}

fn push_packaging(out: &mut String, frame: &StackFrame) {
    if let Some(packaging) = frame.packaging() {
        let _ = write!(
            out,
            " {}[{}:{}]",
            if packaging.exact { "" } else { "~" },
            packaging.code_location,
            packaging.version
        );
    }
}

fn push_skipped(out: &mut String, skipped: usize) {
    let _ = write!(out, " [{} skipped]", skipped);
}
