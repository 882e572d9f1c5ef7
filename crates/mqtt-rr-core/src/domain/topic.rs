//! MQTT topic filters.
//!
//! `+` matches exactly one level, `#` matches the remaining levels (including
//! none) and may only appear as the last level. Topics starting with `$` are
//! not matched by a filter whose first level is a wildcard.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LEVEL_SEPARATOR: char = '/';
pub const SINGLE_LEVEL: &str = "+";
pub const MULTI_LEVEL: &str = "#";

/// A validated topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicFilter(String);

impl TopicFilter {
    /// Validate and wrap a filter string.
    pub fn new(filter: impl Into<String>) -> Result<Self, ConfigError> {
        let filter = filter.into();
        validate_filter(&filter)?;
        Ok(Self(filter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this filter contains `+` or `#`.
    pub fn has_wildcards(&self) -> bool {
        self.0
            .split(LEVEL_SEPARATOR)
            .any(|level| level == SINGLE_LEVEL || level == MULTI_LEVEL)
    }

    /// Whether a concrete topic matches this filter.
    pub fn matches(&self, topic: &str) -> bool {
        matches_filter(&self.0, topic)
    }

    /// Whether every topic matched by `other` is also matched by `self`.
    ///
    /// `a/#` covers `a/b`, `a/+` and `a/b/#`; `a/+` covers `a/b` but not `a/#`.
    pub fn covers(&self, other: &TopicFilter) -> bool {
        let mut mine = self.0.split(LEVEL_SEPARATOR);
        let mut theirs = other.0.split(LEVEL_SEPARATOR);
        loop {
            match (mine.next(), theirs.next()) {
                (Some(MULTI_LEVEL), _) => return true,
                (None, None) => return true,
                (Some(_), Some(MULTI_LEVEL)) => return false,
                (Some(SINGLE_LEVEL), Some(_)) => continue,
                (Some(_), Some(SINGLE_LEVEL)) => return false,
                (Some(a), Some(b)) if a == b => continue,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TopicFilter {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TopicFilter> for String {
    fn from(filter: TopicFilter) -> Self {
        filter.0
    }
}

/// Validate a topic filter per MQTT 3.1.1 section 4.7.
pub fn validate_filter(filter: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTopicFilter {
        filter: filter.to_string(),
        reason: reason.to_string(),
    };

    if filter.is_empty() {
        return Err(invalid("filter is empty"));
    }
    if filter.contains('\0') {
        return Err(invalid("filter contains a NUL character"));
    }

    let levels: Vec<&str> = filter.split(LEVEL_SEPARATOR).collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != MULTI_LEVEL || i != last) {
            return Err(invalid("'#' must occupy the whole last level"));
        }
        if level.contains('+') && *level != SINGLE_LEVEL {
            return Err(invalid("'+' must occupy a whole level"));
        }
    }
    Ok(())
}

/// Match a concrete topic against a filter string without validating it.
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut f = filter.split(LEVEL_SEPARATOR);
    let mut t = topic.split(LEVEL_SEPARATOR);
    loop {
        match (f.next(), t.next()) {
            (Some(MULTI_LEVEL), _) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => continue,
            (Some(a), Some(b)) if a == b => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
