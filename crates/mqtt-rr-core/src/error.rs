//! Error types for the dispatch and correlation engine.
//!
//! Every per-call failure travels through the same callback channel as a
//! success, so all errors here are `Clone`: one transport failure may need to
//! be handed to several waiting callers.

use crate::domain::CallId;
use std::time::Duration;
use thiserror::Error;

/// Status codes carried by [`crate::Response`] values.
pub mod codes {
    /// Inbound message matched a pending call or observer.
    pub const OK: i32 = 200;

    // Local failures rendered as responses (logging / diagnostics only).
    pub const CONNECTION_ERROR: i32 = -1;
    pub const PUBLISH_ERROR: i32 = -2;
    pub const TIMEOUT: i32 = -3;
    pub const CLOSED: i32 = -4;
}

/// Failures surfaced to callers of the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Submission attempted while the transport is disconnected.
    #[error("Transport is not connected")]
    Connection,

    /// Transport rejected the outbound publish.
    #[error("Publish failed: {cause}")]
    Publish { cause: TransportError },

    /// No matching inbound message arrived before the deadline.
    #[error("Call {call_id} timed out after {}ms", waited.as_millis())]
    Timeout { call_id: CallId, waited: Duration },

    /// No resolver in the chain accepted the inbound topic.
    #[error("No correlation resolver matched topic {topic:?} (tried: {})", tried.join(", "))]
    NoResolverMatched { topic: String, tried: Vec<String> },

    /// A one-shot call handle was enqueued a second time.
    #[error("Already executed")]
    AlreadyExecuted,

    /// Reconnect attempted inside the throttle window.
    #[error("Only one reconnect attempt per window allowed, retry in {}ms", retry_in.as_millis())]
    ReconnectThrottled { retry_in: Duration },

    /// Transport-level failure outside a publish (subscribe, connect).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The dispatcher was shut down before the call completed.
    #[error("Dispatcher closed")]
    Closed,
}

impl DispatchError {
    /// Status code used when this failure is rendered for diagnostics.
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Connection | DispatchError::ReconnectThrottled { .. } => {
                codes::CONNECTION_ERROR
            }
            DispatchError::Publish { .. } | DispatchError::Transport(_) => codes::PUBLISH_ERROR,
            DispatchError::Timeout { .. } => codes::TIMEOUT,
            DispatchError::NoResolverMatched { .. }
            | DispatchError::AlreadyExecuted
            | DispatchError::Closed => codes::CLOSED,
        }
    }

    /// Whether this failure is the timeout outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

/// Errors reported by a [`crate::ports::Transport`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Rejected by transport: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Transport closed")]
    Closed,
}

/// Configuration defects, raised at construction time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one correlation resolver is required")]
    NoResolvers,

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid topic filter {filter:?}: {reason}")]
    InvalidTopicFilter { filter: String, reason: String },

    #[error("Invalid QoS {0} (must be 0, 1 or 2)")]
    InvalidQos(u8),

    #[error("Invalid environment variable {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("No tokio runtime available to host the dispatcher")]
    NoRuntime,
}

/// Convenience alias used throughout the crate.
pub type DispatchResult<T> = Result<T, DispatchError>;
