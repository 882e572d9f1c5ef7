//! Outbound Ports (Driven Ports)
//!
//! The engine never speaks a wire protocol itself. A [`Transport`] publishes
//! and subscribes; everything it observes (connection changes, inbound
//! messages, completed actions) flows back as [`TransportEvent`]s through one
//! channel that the dispatcher drains.

use async_trait::async_trait;

use crate::error::TransportError;

/// Events a transport reports to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection (re)established.
    Connected {
        /// `true` when this follows a lost connection
        reconnect: bool,
    },
    /// Connection dropped; the transport may reconnect on its own.
    ConnectionLost(String),
    /// An inbound message.
    MessageArrived { topic: String, payload: Vec<u8> },
    /// Outcome of an asynchronous action (subscribe, unsubscribe, publish ack).
    ActionResult(Result<(), TransportError>),
}

/// Publish/subscribe transport (Driven Port)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the transport currently holds a connection.
    fn is_connected(&self) -> bool;

    /// Establish (or re-establish) the connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Hand one message to the transport.
    ///
    /// Resolves once the transport accepted the message, not when the broker
    /// acknowledged it.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
        retained: bool,
    ) -> Result<(), TransportError>;

    /// Subscribe to `(filter, qos)` pairs.
    async fn subscribe(&self, topics: Vec<(String, u8)>) -> Result<(), TransportError>;

    /// Unsubscribe from filters.
    async fn unsubscribe(&self, topics: Vec<String>) -> Result<(), TransportError>;
}
