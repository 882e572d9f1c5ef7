//! Shared test fixtures.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use mqtt_rr_core::{
    Callback, DispatchResult, Dispatcher, DispatcherConfig, MemoryTransport, Request, Response,
    RrClient, TopicResolver, Transport,
};

/// A dispatcher wired to an in-memory transport.
pub struct Harness {
    pub client: RrClient,
    pub dispatcher: Dispatcher,
    pub transport: Arc<MemoryTransport>,
}

impl Harness {
    /// Connected transport, topic-as-key resolution, default configuration.
    pub async fn connected() -> Self {
        Self::with_config(DispatcherConfig::default()).await
    }

    pub async fn with_config(config: DispatcherConfig) -> Self {
        let harness = Self::build(config);
        harness
            .transport
            .connect()
            .await
            .expect("memory transport connects");
        harness
    }

    /// Harness whose transport never connected.
    pub fn disconnected() -> Self {
        Self::build(DispatcherConfig::default())
    }

    fn build(config: DispatcherConfig) -> Self {
        let (transport, events) = MemoryTransport::new();
        let dispatcher = Dispatcher::builder(config)
            .resolver(TopicResolver)
            .build(transport.clone(), events)
            .expect("valid dispatcher configuration");
        Self {
            client: RrClient::new(dispatcher.clone()),
            dispatcher,
            transport,
        }
    }
}

/// Callback forwarding every outcome into a channel.
pub fn recording_callback() -> (impl Callback, UnboundedReceiver<DispatchResult<Response>>) {
    let (tx, rx) = unbounded_channel();
    let callback = move |outcome: DispatchResult<Response>| {
        let _ = tx.send(outcome);
    };
    (callback, rx)
}

/// Request answered on `key`, published on `cmd/<key>`.
pub fn request(key: &str, timeout: Duration) -> Request {
    Request::builder()
        .topic(format!("cmd/{key}"))
        .back_name(key)
        .timeout(timeout)
        .build()
}

/// Decoded payload of a successful outcome.
pub fn data(outcome: DispatchResult<Response>) -> String {
    outcome
        .expect("call resolved")
        .data()
        .unwrap_or_default()
        .to_string()
}
