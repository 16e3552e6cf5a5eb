//! Key patterns for bulk invalidation.

use regex::Regex;

use crate::error::{CacheError, Result};

/// Matches cache keys for `invalidate_pattern`.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// A single key
    Exact(String),
    /// Every key starting with the prefix
    Prefix(String),
    /// Every key the expression finds a match in
    Regex(Regex),
}

impl KeyPattern {
    /// Keys of the form `<namespace>:...`.
    pub fn namespace(ns: &str) -> Self {
        Self::Prefix(format!("{ns}:"))
    }

    /// Compiles `pattern` into a regex matcher.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| CacheError::InvalidPattern(format!("'{pattern}': {e}")))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(exact) => key == exact,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Regex(re) => re.is_match(key),
        }
    }
}
