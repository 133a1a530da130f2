//! Immutable bus messages
//!
//! A [`Message`] is frozen at construction: every field is private and the body
//! sits behind an `Arc`, so clones handed to queues and subscribers share the same
//! read-only data. Each instance gets a fresh id and a content hash that covers
//! the id and timestamp, so two structurally identical publishes never collide.

use crate::error::BusError;
use crate::topic::validate_topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lowest-urgency priority; lower numbers are delivered first
pub const MAX_PRIORITY: u8 = 9;
pub const DEFAULT_PRIORITY: u8 = 5;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// What a message represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Event,
    Command,
    Request,
    Reply,
    Alert,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Event => "event",
            MessageKind::Command => "command",
            MessageKind::Request => "request",
            MessageKind::Reply => "reply",
            MessageKind::Alert => "alert",
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[derive(Debug, Serialize)]
struct MessageBody {
    id: Uuid,
    kind: MessageKind,
    topic: String,
    payload: Value,
    timestamp: DateTime<Utc>,
    #[serde(rename = "ttl_ms", serialize_with = "serialize_millis")]
    ttl: Duration,
    priority: u8,
    correlation_id: Option<Uuid>,
    reply_to: Option<String>,
    content_hash: String,
    #[serde(skip)]
    size_bytes: u64,
}

/// An immutable message travelling through the bus
#[derive(Debug, Clone)]
pub struct Message {
    body: Arc<MessageBody>,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.body.id == other.body.id
    }
}

impl Eq for Message {}

impl Message {
    /// Build an event with default ttl and priority
    pub fn new(topic: impl Into<String>, payload: Value) -> Result<Self, BusError> {
        Self::builder(topic, payload).build()
    }

    pub fn builder(topic: impl Into<String>, payload: Value) -> MessageBuilder {
        MessageBuilder {
            topic: topic.into(),
            payload,
            kind: MessageKind::Event,
            priority: DEFAULT_PRIORITY,
            ttl: DEFAULT_TTL,
            correlation_id: None,
            reply_to: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.body.id
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind
    }

    pub fn topic(&self) -> &str {
        &self.body.topic
    }

    pub fn payload(&self) -> &Value {
        &self.body.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.body.timestamp
    }

    pub fn ttl(&self) -> Duration {
        self.body.ttl
    }

    pub fn priority(&self) -> u8 {
        self.body.priority
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        self.body.correlation_id
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.body.reply_to.as_deref()
    }

    /// Hex-encoded SHA-256 over id, kind, topic, payload and timestamp
    pub fn content_hash(&self) -> &str {
        &self.body.content_hash
    }

    /// Approximate size used for queue byte limits
    pub fn size_bytes(&self) -> u64 {
        self.body.size_bytes
    }

    /// True iff `now >= timestamp + ttl`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.body.ttl)
            .ok()
            .and_then(|ttl| self.body.timestamp.checked_add_signed(ttl))
        {
            Some(deadline) => now >= deadline,
            // ttl too large to represent: never expires
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Builder for [`Message`]; validation happens in [`MessageBuilder::build`]
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    topic: String,
    payload: Value,
    kind: MessageKind,
    priority: u8,
    ttl: Duration,
    correlation_id: Option<Uuid>,
    reply_to: Option<String>,
}

impl MessageBuilder {
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn reply_to(mut self, topic: impl Into<String>) -> Self {
        self.reply_to = Some(topic.into());
        self
    }

    pub fn build(self) -> Result<Message, BusError> {
        self.build_at(Utc::now())
    }

    /// Build with an explicit timestamp
    pub fn build_at(self, timestamp: DateTime<Utc>) -> Result<Message, BusError> {
        validate_topic(&self.topic)?;
        if let Some(reply_to) = &self.reply_to {
            validate_topic(reply_to)?;
        }
        if self.priority > MAX_PRIORITY {
            return Err(BusError::InvalidMessage(format!(
                "priority {} out of range 0..={}",
                self.priority, MAX_PRIORITY
            )));
        }

        let id = Uuid::new_v4();
        let payload_json = self.payload.to_string();

        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(self.topic.as_bytes());
        hasher.update(payload_json.as_bytes());
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| timestamp.timestamp_micros())
                .to_be_bytes(),
        );
        let content_hash = hex::encode(hasher.finalize());

        let size_bytes = (self.topic.len() + payload_json.len()) as u64;

        Ok(Message {
            body: Arc::new(MessageBody {
                id,
                kind: self.kind,
                topic: self.topic,
                payload: self.payload,
                timestamp,
                ttl: self.ttl,
                priority: self.priority,
                correlation_id: self.correlation_id,
                reply_to: self.reply_to,
                content_hash,
                size_bytes,
            }),
        })
    }
}
