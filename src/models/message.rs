use serde::{Deserialize, Serialize};

use crate::models::headers::Headers;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The body every producer publishes onto the main queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub email: String,
    pub message: String,
    pub subject: String,
}

/// Broker-independent view of a message. Body bytes never change once
/// published; headers may be rewritten on every retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub body: Vec<u8>,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub message_id: Option<String>,
}

impl Message {
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            body,
            headers: Headers::new(),
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            message_id: None,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Message id for log fields; empty when the producer never set one.
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or_default()
    }
}

/// A received message together with the channel-scoped tag that resolves it.
/// The tag is only meaningful on the channel the message arrived on.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub message: Message,
}

impl Delivery {
    pub fn new(delivery_tag: u64, message: Message) -> Self {
        Self {
            delivery_tag,
            message,
        }
    }
}
