//! Adapters Layer
//!
//! Concrete [`crate::ports::Transport`] implementations.

pub mod memory;
#[cfg(feature = "rumqttc")]
pub mod rumqttc;

pub use memory::{MemoryTransport, PublishedMessage};
#[cfg(feature = "rumqttc")]
pub use self::rumqttc::RumqttcTransport;
