//! Dispatcher configuration with validation.
//!
//! The configuration is an immutable value handed to the dispatcher at
//! construction; there are no process-wide defaults.

use crate::domain::charset::Charset;
use crate::domain::subscriptions::TopicSubscription;
use crate::domain::topic::validate_filter;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default response timeout when a request carries none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum spacing between reconnect attempts.
pub const DEFAULT_RECONNECT_WINDOW: Duration = Duration::from_secs(5);

/// Capacity of the transport event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Main dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Response timeout for requests without their own
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Charset used to decode inbound payloads
    pub charset: Charset,
    /// Topic used when a request names none
    pub base_topic: String,
    /// QoS used when a request names none
    pub default_qos: u8,
    /// Retain flag used when a request names none
    pub retained: bool,
    /// Re-issue recorded subscriptions on every (re)connect
    pub auto_subscribe: bool,
    /// Subscriptions installed at construction
    pub subscriptions: Vec<TopicSubscription>,
    /// Reconnect throttle window
    #[serde(with = "humantime_serde")]
    pub reconnect_window: Duration,
    /// Bound of the transport event channel
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            charset: Charset::default(),
            base_topic: String::new(),
            default_qos: 0,
            retained: false,
            auto_subscribe: true,
            subscriptions: Vec::new(),
            reconnect_window: DEFAULT_RECONNECT_WINDOW,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout cannot be 0".into(),
            ));
        }

        if self.default_qos > 2 {
            return Err(ConfigError::InvalidQos(self.default_qos));
        }

        if !self.base_topic.is_empty() {
            validate_filter(&self.base_topic)?;
            if self.base_topic.contains(['+', '#']) {
                return Err(ConfigError::InvalidTopicFilter {
                    filter: self.base_topic.clone(),
                    reason: "base topic cannot contain wildcards".into(),
                });
            }
        }

        for sub in &self.subscriptions {
            if sub.qos > 2 {
                return Err(ConfigError::InvalidQos(sub.qos));
            }
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidEnv {
                name: "event_capacity".into(),
                reason: "cannot be 0".into(),
            });
        }

        Ok(())
    }

    /// Defaults overlaid with `RR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("RR_DEFAULT_TIMEOUT") {
            config.default_timeout = humantime_serde::re::humantime::parse_duration(raw.trim())
                .map_err(|e| invalid_env("RR_DEFAULT_TIMEOUT", e))?;
        }
        if let Some(raw) = lookup("RR_CHARSET") {
            config.charset = raw
                .parse()
                .map_err(|e: String| invalid_env("RR_CHARSET", e))?;
        }
        if let Some(raw) = lookup("RR_BASE_TOPIC") {
            config.base_topic = raw.trim().to_string();
        }
        if let Some(raw) = lookup("RR_AUTO_SUBSCRIBE") {
            config.auto_subscribe = parse_bool(&raw)
                .ok_or_else(|| invalid_env("RR_AUTO_SUBSCRIBE", "expected true/false"))?;
        }
        if let Some(raw) = lookup("RR_DEFAULT_QOS") {
            config.default_qos = raw
                .trim()
                .parse()
                .map_err(|e| invalid_env("RR_DEFAULT_QOS", e))?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn invalid_env(name: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnv {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
