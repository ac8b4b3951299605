//! Turn data: who sent what, and what is needed to answer it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::state::ConversationState;
use crate::transport::{Transport, TransportError};

/// Conversation participant, as identified by the transport.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound chat message.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InboundEvent {
    /// Channel (e.g., "meta", "telegram", "cli")
    pub channel: String,

    /// Sender ID (channel-specific)
    pub sender_id: String,

    /// Sender display name, when the channel provides one
    pub sender_name: Option<String>,

    /// Message content
    pub body: String,

    /// Where replies go (phone number, chat id)
    pub reply_to: String,

    /// Message ID from channel
    pub message_id: Option<String>,

    /// Unix timestamp (ms)
    pub received_at: i64,
}

impl InboundEvent {
    /// Create a new event received now.
    pub fn new(channel: &str, sender_id: &str, reply_to: &str, body: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: None,
            body: body.to_string(),
            reply_to: reply_to.to_string(),
            message_id: None,
            received_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(self.sender_id.clone())
    }
}

/// One send-ready piece of a reply.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OutboundChunk {
    pub body: String,
}

impl OutboundChunk {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Send capability bound to the chat a turn came from.
#[derive(Clone)]
pub struct Replier {
    transport: Arc<dyn Transport>,
    to: String,
}

impl Replier {
    pub fn new(transport: Arc<dyn Transport>, to: impl Into<String>) -> Self {
        Self {
            transport,
            to: to.into(),
        }
    }

    pub fn max_message_len(&self) -> usize {
        self.transport.max_message_len()
    }

    pub async fn send(&self, chunk: &OutboundChunk) -> Result<(), TransportError> {
        self.transport.send(&self.to, chunk).await
    }
}

/// A turn waiting in a user's queue.
pub struct PendingTurn {
    /// Unique ID (ULID), for log correlation
    pub id: String,
    pub event: InboundEvent,
    pub state: ConversationState,
    pub replier: Replier,
    pub transport: Arc<dyn Transport>,
}

impl PendingTurn {
    pub fn new(
        event: InboundEvent,
        state: ConversationState,
        replier: Replier,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            event,
            state,
            replier,
            transport,
        }
    }
}
