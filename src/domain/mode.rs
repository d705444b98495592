//! Skip-line modes selectable through configuration.

use std::fmt;
use std::str::FromStr;

/// How the `skipLine` property is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SkipLineMode {
    /// Comma-delimited prefixes; lines outside them are skipped.
    AllowList,
    /// Comma-delimited prefixes; lines inside them are skipped.
    #[default]
    DenyList,
    /// Name of a predicate registered by the embedding application.
    ExternalInstance,
    /// Boolean expression over `line`, compiled once.
    CompiledExpression,
}

impl SkipLineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipLineMode::AllowList => "allow-list",
            SkipLineMode::DenyList => "deny-list",
            SkipLineMode::ExternalInstance => "external-instance",
            SkipLineMode::CompiledExpression => "compiled-expression",
        }
    }
}

impl fmt::Display for SkipLineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognised mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown skip line mode '{0}'")]
pub struct UnknownModeError(pub String);

impl FromStr for SkipLineMode {
    type Err = UnknownModeError;

    /// Case-insensitive; `-`, `_` and spaces are interchangeable. The legacy
    /// names `WHITELIST`, `BLACKLIST`, `PREDICATE_CLASS` and
    /// `JANINO_EXPRESSION` are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "allowlist" | "whitelist" => Ok(SkipLineMode::AllowList),
            "denylist" | "blacklist" => Ok(SkipLineMode::DenyList),
            "externalinstance" | "predicateclass" | "instance" => {
                Ok(SkipLineMode::ExternalInstance)
            }
            "compiledexpression" | "janinoexpression" | "expression" => {
                Ok(SkipLineMode::CompiledExpression)
            }
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}
