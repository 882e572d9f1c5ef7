//! Outbound request record.

use std::time::Duration;

/// One outbound message plus the correlation hints the dispatcher needs to
/// match its answer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    topic: String,
    payload: Vec<u8>,
    back_name: Option<String>,
    timeout: Option<Duration>,
    qos: Option<u8>,
    retained: Option<bool>,
    tag: Option<String>,
}

impl Request {
    /// Start building a request.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Publish topic. Empty means "use the configured base topic".
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Correlation key the answer will resolve to.
    pub fn back_name(&self) -> Option<&str> {
        self.back_name.as_deref()
    }

    /// Per-call deadline override. `None` (or zero) means the client default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    pub fn qos(&self) -> Option<u8> {
        self.qos
    }

    pub fn retained(&self) -> Option<bool> {
        self.retained
    }

    /// Opaque caller tag, carried for logging.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Topic to publish on, falling back to `base_topic` when none was set.
    pub fn effective_topic<'a>(&'a self, base_topic: &'a str) -> &'a str {
        if self.topic.is_empty() {
            base_topic
        } else {
            &self.topic
        }
    }

    /// Correlation key, falling back to the effective topic when no
    /// back-name was set.
    pub fn correlation_key<'a>(&'a self, base_topic: &'a str) -> &'a str {
        match self.back_name.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => self.effective_topic(base_topic),
        }
    }
}

/// Builder for [`Request`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
    topic: String,
    payload: Vec<u8>,
    back_name: Option<String>,
    timeout: Option<Duration>,
    qos: Option<u8>,
    retained: Option<bool>,
    tag: Option<String>,
}

impl RequestBuilder {
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn back_name(mut self, key: impl Into<String>) -> Self {
        self.back_name = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn qos(mut self, qos: u8) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn retained(mut self, retained: bool) -> Self {
        self.retained = Some(retained);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn build(self) -> Request {
        Request {
            topic: self.topic,
            payload: self.payload,
            back_name: self.back_name,
            timeout: self.timeout,
            qos: self.qos,
            retained: self.retained,
            tag: self.tag,
        }
    }
}
