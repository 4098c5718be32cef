//! Chat data model shared by the server, its REST clients and the push
//! channel.
//!
//! All types serialize with camelCase field names so REST bodies, push
//! frames and journal records share one representation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, Participants};

/// Default maximum message body size in bytes (64 KB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a chat session between two participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChatId(Uuid);

impl ChatId {
    /// Creates a new chat identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `ChatId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChatId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The unique durable pairing between two identities.
///
/// Immutable once created. Messages are not embedded; they are owned by the
/// message store and joined in at read time (see [`ChatThread`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Session identifier.
    pub id: ChatId,
    /// The two participants, in canonical order.
    pub participants: Participants,
    /// When the session was first created.
    pub created_at: Timestamp,
}

impl ChatSession {
    /// Creates a fresh session for the given pair, stamped now.
    #[must_use]
    pub fn new(participants: Participants) -> Self {
        Self {
            id: ChatId::new(),
            participants,
            created_at: Timestamp::now(),
        }
    }
}

/// An immutable, persisted unit of chat content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned message identifier.
    pub id: MessageId,
    /// Session this message belongs to.
    pub chat_id: ChatId,
    /// Who sent it.
    pub sender_id: Identity,
    /// Who it is addressed to.
    pub receiver_id: Identity,
    /// Text as submitted by the sender.
    pub body: String,
    /// Server-assigned send time.
    pub sent_at: Timestamp,
}

impl Message {
    /// Ordering key for a chat log: `sent_at`, then `id` as tie-break.
    #[must_use]
    pub const fn order_key(&self) -> (Timestamp, MessageId) {
        (self.sent_at, self.id)
    }
}

/// A session together with its full ordered message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    /// The session itself.
    #[serde(flatten)]
    pub session: ChatSession,
    /// Messages ordered ascending by `sentAt`.
    pub messages: Vec<Message>,
}

/// Error returned when a message body fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Body is empty after trimming whitespace.
    #[error("message body is empty")]
    Empty,
    /// Body exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates a message body for storage.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if the trimmed body is empty, or
/// [`ValidationError::TooLarge`] if it exceeds `max` bytes.
pub fn validate_body(body: &str, max: usize) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if body.len() > max {
        return Err(ValidationError::TooLarge {
            size: body.len(),
            max,
        });
    }
    Ok(())
}
