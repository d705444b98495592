//! Predicate construction from a skip-line mode and its property value.
//!
//! The variant set is closed. External instances and expression compilers
//! are registered by the embedding application up front instead of being
//! looked up at runtime.

use crate::application::config::ConfigError;
use crate::application::ports::{ExpressionCompiler, SharedPredicate};
use crate::domain::expression::LineExpression;
use crate::domain::mode::SkipLineMode;
use crate::domain::predicate::{AllowListPredicate, DenyListPredicate, LineSkipPredicate};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name under which [`LineExpressionCompiler`] is registered by default.
pub const DEFAULT_COMPILER: &str = "line";

/// Compiles the built-in line expression language.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineExpressionCompiler;

impl ExpressionCompiler for LineExpressionCompiler {
    fn compile(&self, source: &str) -> Result<SharedPredicate, String> {
        LineExpression::compile(source)
            .map(|expression| Arc::new(expression) as SharedPredicate)
            .map_err(|e| e.to_string())
    }
}

/// Builds line skip predicates for every [`SkipLineMode`].
///
/// # Example
/// ```
/// use stack_throttle::{DenyListPredicate, LineSkipPredicate, PredicateFactory, SkipLineMode};
///
/// let factory = PredicateFactory::new()
///     .with_instance("reflection", DenyListPredicate::parse("sun.reflect.,java.lang.reflect."));
///
/// let predicate = factory.build(SkipLineMode::ExternalInstance, "reflection").unwrap();
/// assert!(predicate.should_skip_line("at sun.reflect.GeneratedMethodAccessor1.invoke(Unknown Source)"));
///
/// let predicate = factory
///     .build(SkipLineMode::CompiledExpression, r#"line.contains("$$Lambda")"#)
///     .unwrap();
/// assert!(predicate.should_skip_line("at com.acme.Foo$$Lambda$12.apply(Unknown Source)"));
/// ```
#[derive(Clone)]
pub struct PredicateFactory {
    instances: HashMap<String, SharedPredicate>,
    compilers: HashMap<String, Arc<dyn ExpressionCompiler>>,
    active_compiler: Option<String>,
}

impl PredicateFactory {
    /// A factory with the built-in expression compiler and no external instances.
    pub fn new() -> Self {
        Self::empty().with_expression_compiler(DEFAULT_COMPILER, LineExpressionCompiler)
    }

    /// A factory with nothing registered. Expression mode fails until a
    /// compiler is added.
    pub fn empty() -> Self {
        Self {
            instances: HashMap::new(),
            compilers: HashMap::new(),
            active_compiler: None,
        }
    }

    /// Register a predicate reachable in external-instance mode by `name`.
    pub fn with_instance(
        self,
        name: impl Into<String>,
        predicate: impl LineSkipPredicate + 'static,
    ) -> Self {
        self.with_shared_instance(name, Arc::new(predicate))
    }

    pub fn with_shared_instance(mut self, name: impl Into<String>, predicate: SharedPredicate) -> Self {
        self.instances.insert(name.into(), predicate);
        self
    }

    /// Register an expression compiler and make it the one used for
    /// compiled-expression mode.
    pub fn with_expression_compiler(
        mut self,
        name: impl Into<String>,
        compiler: impl ExpressionCompiler + 'static,
    ) -> Self {
        let name = name.into();
        self.compilers.insert(name.clone(), Arc::new(compiler));
        self.active_compiler = Some(name);
        self
    }

    /// Switch compiled-expression mode to a previously registered compiler.
    pub fn use_compiler(mut self, name: impl Into<String>) -> Self {
        self.active_compiler = Some(name.into());
        self
    }

    /// Names of the registered external instances.
    pub fn instance_names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    /// Build the predicate for `mode` from the raw `skipLine` property.
    pub fn build(&self, mode: SkipLineMode, property: &str) -> Result<SharedPredicate, ConfigError> {
        match mode {
            SkipLineMode::AllowList => Ok(Arc::new(AllowListPredicate::parse(property))),
            SkipLineMode::DenyList => Ok(Arc::new(DenyListPredicate::parse(property))),
            SkipLineMode::ExternalInstance => {
                let name = property.trim();
                self.instances
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownInstance(name.to_string()))
            }
            SkipLineMode::CompiledExpression => {
                let compiler_name = self
                    .active_compiler
                    .as_deref()
                    .ok_or(ConfigError::NoCompiler)?;
                let compiler = self
                    .compilers
                    .get(compiler_name)
                    .ok_or_else(|| ConfigError::UnknownCompiler(compiler_name.to_string()))?;
                compiler
                    .compile(property)
                    .map_err(|reason| ConfigError::InvalidExpression {
                        expression: property.to_string(),
                        reason,
                    })
            }
        }
    }
}

impl Default for PredicateFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PredicateFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut instances: Vec<&str> = self.instances.keys().map(String::as_str).collect();
        instances.sort_unstable();
        let mut compilers: Vec<&str> = self.compilers.keys().map(String::as_str).collect();
        compilers.sort_unstable();
        f.debug_struct("PredicateFactory")
            .field("instances", &instances)
            .field("compilers", &compilers)
            .field("active_compiler", &self.active_compiler)
            .finish()
    }
}
