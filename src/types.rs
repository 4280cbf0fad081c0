//! Core types for the event feed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Instant;

use crate::error::{FeedError, Result};

/// Identifies the logical operation (workspace) that partitions events
/// on the shared transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription, allocated by the manager.
/// Never reused for the lifetime of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of event pushed by the server.
///
/// Matching is by exact tag equality; new server-side tags surface as
/// `Other` without changing the dispatch contract.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Output produced by a running task.
    TaskOutput,
    /// Agent callback check-in or update.
    Callback,
    /// File upload/download progress.
    File,
    /// Any tag this crate does not know about.
    Other(String),
}

impl EventType {
    /// The wire tag for this event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::TaskOutput => "task_output",
            EventType::Callback => "callback",
            EventType::File => "file",
            EventType::Other(tag) => tag,
        }
    }

    /// Parse a wire tag. Unknown tags become `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "task_output" => EventType::TaskOutput,
            "callback" => EventType::Callback,
            "file" => EventType::File,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        EventType::from_tag(&tag)
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

/// One opaque message pushed by the transport, not yet parsed.
#[derive(Clone, Debug)]
pub struct RawMessage {
    pub bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

/// A parsed server-pushed event.
///
/// Immutable once constructed; the dispatcher shares one `Arc<Envelope>`
/// across every matching subscription rather than copying the field map.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Exact event tag.
    pub event_type: EventType,

    /// Read-only snapshot of the message fields.
    pub fields: Map<String, Value>,

    /// Operation scope carried in the message, if any. Messages without
    /// an explicit scope belong to whichever feed they arrived on.
    pub operation: Option<OperationId>,

    /// Monotonic arrival stamp. Orders events within one subscription,
    /// never across subscriptions.
    pub received_at: Instant,
}

impl Envelope {
    /// Parse a raw transport message.
    ///
    /// The payload must be a JSON object with a string `type` field.
    /// Anything else is a malformed message.
    pub fn parse(raw: &RawMessage) -> Result<Self> {
        let value: Value = serde_json::from_slice(&raw.bytes)
            .map_err(|e| FeedError::Malformed(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(FeedError::Malformed("payload is not a JSON object".into()));
        };

        let tag = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| FeedError::Malformed("missing string `type` field".into()))?;

        let event_type = EventType::from_tag(tag);
        let operation = fields
            .get("operation_id")
            .and_then(Value::as_u64)
            .map(OperationId);

        Ok(Self {
            event_type,
            fields,
            operation,
            received_at: Instant::now(),
        })
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
