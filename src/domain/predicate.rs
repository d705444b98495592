//! Line skip predicates.
//!
//! A predicate answers two questions for the renderer: should skipping be
//! enabled at all for this exception, and should this particular rendered
//! frame line be left out.

use crate::domain::exception::ExceptionProxy;
use std::fmt;
use std::sync::Arc;

/// Decides which stack lines to omit.
pub trait LineSkipPredicate: Send + Sync + fmt::Debug {
    /// Whether line skipping applies to this exception at all.
    fn should_enable_skip(&self, _exception: &ExceptionProxy) -> bool {
        true
    }

    /// Whether the rendered line (`at <frame>`) should be omitted.
    fn should_skip_line(&self, line: &str) -> bool;
}

impl<P: LineSkipPredicate + ?Sized> LineSkipPredicate for Arc<P> {
    fn should_enable_skip(&self, exception: &ExceptionProxy) -> bool {
        (**self).should_enable_skip(exception)
    }

    fn should_skip_line(&self, line: &str) -> bool {
        (**self).should_skip_line(line)
    }
}

/// Split a comma-delimited prefix list, dropping blanks and duplicates while
/// keeping the first-seen order.
fn parse_prefixes(property: &str) -> Vec<String> {
    let mut prefixes: Vec<String> = Vec::new();
    for prefix in property.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let line_prefix = format!("at {}", prefix);
        if !prefixes.contains(&line_prefix) {
            prefixes.push(line_prefix);
        }
    }
    prefixes
}

/// Keeps only lines whose frame starts with one of the prefixes.
#[derive(Debug, Clone)]
pub struct AllowListPredicate {
    prefixes: Vec<String>,
}

impl AllowListPredicate {
    /// Build from a comma-delimited list such as `com.acme.,org.example.`.
    pub fn parse(property: &str) -> Self {
        Self {
            prefixes: parse_prefixes(property),
        }
    }

    /// Number of distinct prefixes.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl LineSkipPredicate for AllowListPredicate {
    fn should_skip_line(&self, line: &str) -> bool {
        !self.prefixes.iter().any(|p| line.starts_with(p.as_str()))
    }
}

/// Drops lines whose frame starts with one of the prefixes.
#[derive(Debug, Clone)]
pub struct DenyListPredicate {
    prefixes: Vec<String>,
}

impl DenyListPredicate {
    /// Build from a comma-delimited list such as `sun.reflect.,java.lang.reflect.`.
    pub fn parse(property: &str) -> Self {
        Self {
            prefixes: parse_prefixes(property),
        }
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl LineSkipPredicate for DenyListPredicate {
    fn should_skip_line(&self, line: &str) -> bool {
        self.prefixes.iter().any(|p| line.starts_with(p.as_str()))
    }
}

/// Adapts a closure over the line into a predicate.
pub struct FnPredicate<F> {
    name: &'static str,
    f: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate")
            .field("name", &self.name)
            .field("f", &"<fn>")
            .finish()
    }
}

impl<F> LineSkipPredicate for FnPredicate<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn should_skip_line(&self, line: &str) -> bool {
        (self.f)(line)
    }
}
