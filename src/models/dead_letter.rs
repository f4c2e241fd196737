use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{error::StoreError, models::headers::Headers};

/// Row shape handed to the repository on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeadLetter {
    pub message_id: String,
    pub headers: JsonValue,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Row shape as read back from storage, headers still encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRow {
    pub message_id: String,
    pub headers: JsonValue,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    pub message_id: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn from_row(row: DeadLetterRow) -> Result<Self, StoreError> {
        Ok(Self {
            headers: Headers::from_json(&row.headers)?,
            message_id: row.message_id,
            body: row.body,
            content_type: row.content_type,
            received_at: row.received_at,
        })
    }
}

/// `/inspect` wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectEntry {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Headers")]
    pub headers: JsonValue,

    #[serde(rename = "Payload")]
    pub payload: String,

    #[serde(rename = "Type")]
    pub content_type: String,
}

impl From<&DeadLetterRecord> for InspectEntry {
    fn from(record: &DeadLetterRecord) -> Self {
        Self {
            id: record.message_id.clone(),
            headers: record.headers.to_json(),
            payload: String::from_utf8_lossy(&record.body).into_owned(),
            content_type: record.content_type.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueRequest {
    #[serde(rename = "MessageId", alias = "messageId", alias = "message_id")]
    pub message_id: String,
}
