//! # mqtt-rr node
//!
//! Demo entry point for the dispatch engine.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RR_LOG_LEVEL`, `RR_JSON_LOGS`)
//! 2. Load dispatcher configuration from `RR_*` variables
//! 3. Connect the transport and build the dispatcher
//! 4. Run one request/reply call and one observation
//! 5. Wait for Ctrl+C (`RR_DEMO_EXIT=1` exits right after the demo)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use mqtt_rr_core::{
    DispatchResult, Dispatcher, DispatcherConfig, JsonFieldResolver, MemoryTransport, Request,
    Response, RrClient, TopicResolver, TopicSubscription, Transport, TransportEvent,
};
use mqtt_rr_telemetry::{init_tracing, TelemetryConfig};

const DEMO_FILTER: &str = "demo/#";

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing(&TelemetryConfig::for_service("mqtt-rr-node"))
        .context("Failed to initialize tracing")?;

    let config = DispatcherConfig::from_env().context("Invalid dispatcher configuration")?;
    info!(?config, "Loaded configuration");

    let (transport, events, memory) = connect_transport(&config).await?;

    let dispatcher = Dispatcher::builder(config)
        .resolver(JsonFieldResolver::new("type"))
        .resolver(TopicResolver)
        .build(transport, events)
        .context("Failed to build dispatcher")?;
    let client = RrClient::new(dispatcher.clone());

    let delta = client
        .subscribe(vec![TopicSubscription::new(DEMO_FILTER, 1)?])
        .await
        .context("Subscribe failed")?;
    info!(?delta, "Subscribed");

    run_call(&client).await;
    run_observation(&client, memory.as_deref()).await?;

    info!(stats = ?client.stats(), "Demo finished");

    if std::env::var("RR_DEMO_EXIT").is_err() {
        info!("Node is running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
    }

    dispatcher.shutdown();
    Ok(())
}

type Connected = (
    Arc<dyn Transport>,
    mpsc::Receiver<TransportEvent>,
    Option<Arc<MemoryTransport>>,
);

/// In-memory broker with loopback, so requests on `demo/#` answer themselves.
async fn memory_transport(config: &DispatcherConfig) -> Result<Connected> {
    let (transport, events) = MemoryTransport::with_capacity(config.event_capacity);
    transport.set_loopback(true);
    transport.connect().await.context("Memory transport connect failed")?;
    let shared: Arc<dyn Transport> = transport.clone();
    Ok((shared, events, Some(transport)))
}

#[cfg(not(feature = "mqtt"))]
async fn connect_transport(config: &DispatcherConfig) -> Result<Connected> {
    memory_transport(config).await
}

#[cfg(feature = "mqtt")]
async fn connect_transport(config: &DispatcherConfig) -> Result<Connected> {
    use mqtt_rr_core::RumqttcTransport;

    let Ok(host) = std::env::var("RR_BROKER_HOST") else {
        warn!("RR_BROKER_HOST not set, using the in-memory broker");
        return memory_transport(config).await;
    };
    let port = match std::env::var("RR_BROKER_PORT") {
        Ok(port) => port.parse().context("RR_BROKER_PORT must be a port number")?,
        Err(_) => 1883,
    };
    let client_id =
        std::env::var("RR_CLIENT_ID").unwrap_or_else(|_| "mqtt-rr-node".to_string());

    let mut options = rumqttc::MqttOptions::new(client_id, host.clone(), port);
    options.set_keep_alive(Duration::from_secs(30));

    let (transport, events) = RumqttcTransport::new(options, config.event_capacity);
    transport
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;
    info!(%host, port, "Connecting to MQTT broker");
    let shared: Arc<dyn Transport> = transport;
    Ok((shared, events, None))
}

async fn run_call(client: &RrClient) {
    let request = Request::builder()
        .topic("demo/device/42/cmd")
        .payload(r#"{"type":"get_list","items":["a","b"]}"#)
        .back_name("get_list")
        .timeout(Duration::from_secs(2))
        .build();

    match client.new_call(request).execute().await {
        Ok(response) => info!(
            code = response.code(),
            data = ?response.data(),
            "Call resolved"
        ),
        Err(e) if e.is_timeout() => warn!(error = %e, "Call timed out"),
        Err(e) => error!(error = %e, "Call failed"),
    }
}

async fn run_observation(client: &RrClient, memory: Option<&MemoryTransport>) -> Result<()> {
    let observable = client.new_observable(
        Request::builder()
            .topic("demo/device/42/status")
            .back_name("status")
            .build(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    observable.subscribe(move |outcome: DispatchResult<Response>| {
        let _ = tx.send(outcome);
    })?;

    if let Some(memory) = memory {
        for level in [80, 65] {
            let payload = format!(r#"{{"type":"status","battery":{level}}}"#);
            memory.inject("demo/device/42/status", payload.into_bytes()).await?;
        }
    }

    let deadline = tokio::time::sleep(Duration::from_secs(2));
    tokio::pin!(deadline);
    let mut seen = 0;
    while seen < 2 {
        tokio::select! {
            Some(outcome) = rx.recv() => {
                seen += 1;
                match outcome {
                    Ok(response) => info!(data = ?response.data(), "Observed status"),
                    Err(e) => warn!(error = %e, "Observation failure"),
                }
            }
            _ = &mut deadline => break,
        }
    }

    observable.cancel();
    Ok(())
}
