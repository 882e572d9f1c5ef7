//! In-memory transport.
//!
//! Simulates a broker inside the process: publishes are recorded, filters
//! are tracked, and inbound traffic is injected by the test (or looped back
//! from matching publishes). No network, no persistence.

use crate::domain::config::DEFAULT_EVENT_CAPACITY;
use crate::domain::topic::matches_filter;
use crate::error::TransportError;
use crate::ports::{Transport, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One recorded publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retained: bool,
}

/// In-process transport used by tests and the demo node.
///
/// Starts disconnected; `connect()` flips the flag and reports
/// [`TransportEvent::Connected`].
pub struct MemoryTransport {
    events: mpsc::Sender<TransportEvent>,
    connected: AtomicBool,
    ever_connected: AtomicBool,
    loopback: AtomicBool,
    fail_publishes: AtomicUsize,
    fail_subscribes: AtomicUsize,
    fail_unsubscribes: AtomicUsize,
    published: Mutex<Vec<PublishedMessage>>,
    filters: Mutex<BTreeMap<String, u8>>,
    publish_count: AtomicU64,
}

impl MemoryTransport {
    /// Create a transport and the event receiver to hand to the dispatcher.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (events, receiver) = mpsc::channel(capacity.max(1));
        let transport = Self {
            events,
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            loopback: AtomicBool::new(false),
            fail_publishes: AtomicUsize::new(0),
            fail_subscribes: AtomicUsize::new(0),
            fail_unsubscribes: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            filters: Mutex::new(BTreeMap::new()),
            publish_count: AtomicU64::new(0),
        };
        (Arc::new(transport), receiver)
    }

    /// Deliver an inbound message as if the broker had sent it.
    pub async fn inject(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.emit(TransportEvent::MessageArrived {
            topic: topic.to_string(),
            payload,
        })
        .await
    }

    /// Drop the connection and report it.
    pub async fn drop_connection(&self, cause: &str) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::Release);
        self.emit(TransportEvent::ConnectionLost(cause.to_string()))
            .await
    }

    /// Flip the connection flag without emitting events.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Publishes on a subscribed topic come back as inbound messages.
    pub fn set_loopback(&self, enabled: bool) {
        self.loopback.store(enabled, Ordering::Release);
    }

    /// Reject the next `count` publishes.
    pub fn fail_next_publishes(&self, count: usize) {
        self.fail_publishes.store(count, Ordering::Release);
    }

    /// Reject the next `count` subscribe requests. Nothing is installed.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.fail_subscribes.store(count, Ordering::Release);
    }

    /// Reject the next `count` unsubscribe requests. Nothing is removed.
    pub fn fail_next_unsubscribes(&self, count: usize) {
        self.fail_unsubscribes.store(count, Ordering::Release);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Currently subscribed filters, sorted.
    pub fn subscribed_filters(&self) -> Vec<String> {
        self.filters.lock().keys().cloned().collect()
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    async fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::Release);
        let reconnect = self.ever_connected.swap(true, Ordering::AcqRel);
        debug!(reconnect, "Memory transport connected");
        self.emit(TransportEvent::Connected { reconnect }).await
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
        if Self::take_failure(&self.fail_publishes) {
            return Err(TransportError::Rejected("injected publish failure".into()));
        }

        self.publish_count.fetch_add(1, Ordering::Relaxed);
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
            qos,
            retained,
        });

        let echo = self.loopback.load(Ordering::Acquire)
            && self
                .filters
                .lock()
                .keys()
                .any(|filter| matches_filter(filter, topic));
        if echo {
            self.inject(topic, payload).await?;
        }
        Ok(())
    }

    async fn subscribe(&self, topics: Vec<(String, u8)>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if Self::take_failure(&self.fail_subscribes) {
            return Err(TransportError::Rejected("injected subscribe failure".into()));
        }
        let mut filters = self.filters.lock();
        for (topic, qos) in topics {
            filters.insert(topic, qos);
        }
        Ok(())
    }

    async fn unsubscribe(&self, topics: Vec<String>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if Self::take_failure(&self.fail_unsubscribes) {
            return Err(TransportError::Rejected("injected unsubscribe failure".into()));
        }
        let mut filters = self.filters.lock();
        for topic in &topics {
            filters.remove(topic);
        }
        Ok(())
    }
}
