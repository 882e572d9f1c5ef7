//! # mqtt-rr-core
//!
//! Request/reply and persistent observation on top of a fire-and-forget
//! publish/subscribe transport.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): bookkeeping, no I/O
//!   - `PendingRegistry`: correlation key -> FIFO of waiting calls
//!   - `TimeoutQueue`: deadline-ordered timeout entries
//!   - `ResolverChain`: inbound message -> correlation key
//!   - `SubscriptionBook`: reference-counted filters with wildcard coverage
//!   - `DispatcherConfig`: configuration with validation
//!
//! - **Ports Layer** (`ports/`): trait definitions
//!   - `Callback`: driving port, receives call outcomes
//!   - `Transport` / `TransportEvent`: driven port, the pub/sub connection
//!
//! - **Service Layer** (`service/`): orchestration
//!   - `Dispatcher`: submission worker, event loop, timeout waiter
//!   - `RrClient`, `Call`, `Observable`: front door
//!
//! - **Adapters Layer** (`adapters/`)
//!   - `MemoryTransport`: in-process broker
//!   - `RumqttcTransport`: MQTT via `rumqttc` (feature `rumqttc`)
//!
//! ## Invariants
//!
//! - Every pending call is completed exactly once: by an inbound match, its
//!   deadline, a publish failure, or shutdown.
//! - For one correlation key, pending calls are matched in submission order.
//! - A completed call leaves no timeout entry behind.
//!
//! ## Usage Example
//!
//! ```ignore
//! use mqtt_rr_core::{
//!     Dispatcher, DispatcherConfig, JsonFieldResolver, MemoryTransport, Request, RrClient,
//!     TopicResolver, Transport,
//! };
//!
//! let (transport, events) = MemoryTransport::new();
//! transport.connect().await?;
//!
//! let dispatcher = Dispatcher::builder(DispatcherConfig::default())
//!     .resolver(JsonFieldResolver::new("type"))
//!     .resolver(TopicResolver)
//!     .build(transport.clone(), events)?;
//! let client = RrClient::new(dispatcher);
//!
//! let request = Request::builder()
//!     .topic("device/42/cmd")
//!     .payload(r#"{"type":"get_list"}"#)
//!     .back_name("get_list")
//!     .build();
//! let response = client.new_call(request).execute().await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::{MemoryTransport, PublishedMessage};
#[cfg(feature = "rumqttc")]
pub use adapters::RumqttcTransport;
pub use domain::{
    CallId, Charset, CorrelationResolver, DispatcherConfig, FnResolver, JsonFieldResolver,
    Request, RequestBuilder, ResolverChain, Response, ResponseBody, SubscriptionDelta,
    TopicFilter, TopicFilterResolver, TopicResolver, TopicSubscription,
};
pub use error::{codes, ConfigError, DispatchError, DispatchResult, TransportError};
pub use metrics::{DispatchStats, StatsSnapshot};
pub use ports::{Callback, Transport, TransportEvent};
pub use service::{Call, Dispatcher, DispatcherBuilder, Observable, RrClient};
