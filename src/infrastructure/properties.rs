//! Property source adapters.
//!
//! - [`MapPropertySource`]: explicit key/value pairs, deserializable from a flat map
//! - [`EnvPropertySource`]: process environment
//! - [`LayeredPropertySource`]: ordered chain, first hit wins

use crate::application::ports::PropertySource;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Properties held in memory.
///
/// ```
/// use stack_throttle::application::ports::PropertySource;
/// use stack_throttle::infrastructure::properties::MapPropertySource;
///
/// let source = MapPropertySource::new()
///     .with("logback.stackTrace.skipLine", "org.springframework.,sun.reflect.");
/// assert_eq!(
///     source.property("logback.stackTrace.skipLine").as_deref(),
///     Some("org.springframework.,sun.reflect.")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct MapPropertySource {
    properties: HashMap<String, String>,
}

impl MapPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MapPropertySource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl PropertySource for MapPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// Properties read from environment variables.
///
/// A key is looked up verbatim first, then in upper-snake form:
/// `logback.stackTrace.skipLine` becomes `LOGBACK_STACKTRACE_SKIPLINE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPropertySource;

impl EnvPropertySource {
    pub fn new() -> Self {
        Self
    }

    /// Environment variable name for a dotted property key.
    pub fn variable_name(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl PropertySource for EnvPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .or_else(|_| std::env::var(Self::variable_name(key)))
            .ok()
    }
}

/// Chain of property sources consulted in order.
#[derive(Debug, Clone, Default)]
pub struct LayeredPropertySource {
    layers: Vec<Arc<dyn PropertySource>>,
}

impl LayeredPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer with lower precedence than the existing ones.
    pub fn with_layer(mut self, layer: impl PropertySource + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl PropertySource for LayeredPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.property(key))
    }
}
