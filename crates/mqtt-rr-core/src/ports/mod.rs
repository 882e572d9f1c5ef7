//! Ports Layer
//!
//! - Driving Ports (inbound): how callers receive call outcomes
//! - Driven Ports (outbound): what the engine needs from a pub/sub transport

pub mod inbound;
pub mod outbound;

pub use inbound::Callback;
pub use outbound::{Transport, TransportEvent};
