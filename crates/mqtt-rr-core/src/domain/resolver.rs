//! Correlation key resolution.
//!
//! A resolver maps an inbound message to the correlation key ("back-name")
//! that pending calls and observers are registered under, or declines so the
//! next resolver in the chain gets a chance.

use crate::domain::response::ResponseBody;
use crate::domain::topic::TopicFilter;
use crate::error::{ConfigError, DispatchError};
use std::fmt;
use std::sync::Arc;

/// Maps an inbound message to a correlation key.
pub trait CorrelationResolver: Send + Sync {
    /// Short description used in `NoResolverMatched` diagnostics.
    fn name(&self) -> String;

    /// Return the key, or `None` to decline.
    fn resolve(&self, message: &ResponseBody) -> Option<String>;
}

/// Ordered resolvers; the first one that does not decline wins.
#[derive(Clone)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn CorrelationResolver>>,
}

impl ResolverChain {
    /// Build a chain. An empty chain is a configuration error.
    pub fn new(resolvers: Vec<Arc<dyn CorrelationResolver>>) -> Result<Self, ConfigError> {
        if resolvers.is_empty() {
            return Err(ConfigError::NoResolvers);
        }
        Ok(Self { resolvers })
    }

    pub fn resolve(&self, message: &ResponseBody) -> Result<String, DispatchError> {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve(message))
            .ok_or_else(|| DispatchError::NoResolverMatched {
                topic: message.topic.clone(),
                tried: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The topic itself is the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicResolver;

impl CorrelationResolver for TopicResolver {
    fn name(&self) -> String {
        "topic".to_string()
    }

    fn resolve(&self, message: &ResponseBody) -> Option<String> {
        Some(message.topic.clone())
    }
}

/// Topics matching a filter resolve to a fixed key (or to the topic itself
/// when no key is given); everything else is declined.
#[derive(Debug, Clone)]
pub struct TopicFilterResolver {
    filter: TopicFilter,
    key: Option<String>,
}

impl TopicFilterResolver {
    pub fn new(filter: TopicFilter) -> Self {
        Self { filter, key: None }
    }

    pub fn with_key(filter: TopicFilter, key: impl Into<String>) -> Self {
        Self {
            filter,
            key: Some(key.into()),
        }
    }
}

impl CorrelationResolver for TopicFilterResolver {
    fn name(&self) -> String {
        format!("topic-filter({})", self.filter)
    }

    fn resolve(&self, message: &ResponseBody) -> Option<String> {
        if !self.filter.matches(&message.topic) {
            return None;
        }
        Some(self.key.clone().unwrap_or_else(|| message.topic.clone()))
    }
}

/// Reads a string field from a JSON payload, e.g. `{"type":"get_list", ...}`.
///
/// Declines on non-JSON payloads, on a missing or empty field, and on
/// non-string values. Optionally restricted to topics matching a filter.
#[derive(Debug, Clone)]
pub struct JsonFieldResolver {
    field: String,
    filter: Option<TopicFilter>,
}

impl JsonFieldResolver {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            filter: None,
        }
    }

    /// Only consider messages on topics matching `filter`.
    pub fn on_topics(mut self, filter: TopicFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl CorrelationResolver for JsonFieldResolver {
    fn name(&self) -> String {
        match &self.filter {
            Some(filter) => format!("json-field({} on {})", self.field, filter),
            None => format!("json-field({})", self.field),
        }
    }

    fn resolve(&self, message: &ResponseBody) -> Option<String> {
        if let Some(filter) = &self.filter {
            if !filter.matches(&message.topic) {
                return None;
            }
        }
        let value = message.json().ok()?;
        value
            .get(&self.field)?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Closure adapter.
pub struct FnResolver<F> {
    name: String,
    f: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&ResponseBody) -> Option<String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> CorrelationResolver for FnResolver<F>
where
    F: Fn(&ResponseBody) -> Option<String> + Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn resolve(&self, message: &ResponseBody) -> Option<String> {
        (self.f)(message)
    }
}
