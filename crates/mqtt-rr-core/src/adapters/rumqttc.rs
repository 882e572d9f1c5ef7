//! MQTT transport backed by `rumqttc`.
//!
//! `rumqttc` splits a connection into an [`AsyncClient`] (requests) and an
//! [`EventLoop`] (network I/O). The event loop runs on a driver task that
//! translates broker traffic into [`TransportEvent`]s. After a connection
//! error the driver waits for the retry delay, or for an explicit
//! `connect()`, before polling again; polling again is what reconnects.

use crate::error::TransportError;
use crate::ports::{Transport, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// Delay before the driver polls again after a connection error.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

fn to_qos(qos: u8) -> Result<QoS, TransportError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransportError::Rejected(format!("invalid qos {other}"))),
    }
}

fn client_error(e: rumqttc::ClientError) -> TransportError {
    TransportError::Io(e.to_string())
}

struct State {
    connected: AtomicBool,
    ever_connected: AtomicBool,
    retry_now: Notify,
    events: mpsc::Sender<TransportEvent>,
}

/// `rumqttc`-backed [`Transport`].
pub struct RumqttcTransport {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    state: Arc<State>,
    retry_delay: Duration,
}

impl RumqttcTransport {
    /// Create the transport. Nothing touches the network until `connect()`.
    pub fn new(
        options: MqttOptions,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        Self::with_retry_delay(options, capacity, DEFAULT_RETRY_DELAY)
    }

    pub fn with_retry_delay(
        options: MqttOptions,
        capacity: usize,
        retry_delay: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (client, event_loop) = AsyncClient::new(options, capacity.max(1));
        let (events, receiver) = mpsc::channel(capacity.max(1));
        let transport = Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            state: Arc::new(State {
                connected: AtomicBool::new(false),
                ever_connected: AtomicBool::new(false),
                retry_now: Notify::new(),
                events,
            }),
            retry_delay,
        };
        (Arc::new(transport), receiver)
    }
}

async fn drive(mut event_loop: EventLoop, state: Arc<State>, retry_delay: Duration) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                state.connected.store(true, Ordering::Release);
                let reconnect = state.ever_connected.swap(true, Ordering::AcqRel);
                if state
                    .events
                    .send(TransportEvent::Connected { reconnect })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let event = TransportEvent::MessageArrived {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if state.events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) | Ok(Event::Incoming(Packet::UnsubAck(_))) => {
                if state
                    .events
                    .send(TransportEvent::ActionResult(Ok(())))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = state.connected.swap(false, Ordering::AcqRel);
                warn!(error = %e, "MQTT connection error");
                if was_connected
                    && state
                        .events
                        .send(TransportEvent::ConnectionLost(e.to_string()))
                        .await
                        .is_err()
                {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => {}
                    _ = state.retry_now.notified() => {}
                }
            }
        }
    }
    debug!("MQTT driver stopped");
}

#[async_trait]
impl Transport for RumqttcTransport {
    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let event_loop = self.event_loop.lock().take();
        match event_loop {
            Some(event_loop) => {
                debug!("Starting MQTT driver");
                tokio::spawn(drive(event_loop, self.state.clone(), self.retry_delay));
            }
            None => self.state.retry_now.notify_one(),
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
        retained: bool,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .publish(topic, to_qos(qos)?, retained, payload)
            .await
            .map_err(client_error)
    }

    async fn subscribe(&self, topics: Vec<(String, u8)>) -> Result<(), TransportError> {
        let filters = topics
            .into_iter()
            .map(|(topic, qos)| Ok(SubscribeFilter::new(topic, to_qos(qos)?)))
            .collect::<Result<Vec<_>, TransportError>>()?;
        self.client
            .subscribe_many(filters)
            .await
            .map_err(client_error)
    }

    async fn unsubscribe(&self, topics: Vec<String>) -> Result<(), TransportError> {
        for topic in topics {
            self.client.unsubscribe(topic).await.map_err(client_error)?;
        }
        Ok(())
    }
}
