//! Inbound message and response records.

use crate::error::codes;
use serde::Serialize;

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseBody {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload bytes
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Payload decoded with the configured charset
    pub data: String,
}

impl ResponseBody {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, data: String) -> Self {
        Self {
            topic: topic.into(),
            payload,
            data,
        }
    }

    /// Parse the decoded payload as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// What a caller or observer receives for a matched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    code: i32,
    message: Option<String>,
    body: Option<ResponseBody>,
}

impl Response {
    pub fn new(code: i32, message: Option<String>, body: Option<ResponseBody>) -> Self {
        Self {
            code,
            message,
            body,
        }
    }

    /// Successful match carrying the inbound message.
    pub fn ok(body: ResponseBody) -> Self {
        Self::new(codes::OK, None, Some(body))
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// Decoded payload, if any.
    pub fn data(&self) -> Option<&str> {
        self.body.as_ref().map(|b| b.data.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.code == codes::OK
    }
}
