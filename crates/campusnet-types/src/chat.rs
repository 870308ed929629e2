//! Chat, user, and message types for CampusNet.
//!
//! These types model group conversations between students: chats, their
//! members, the messages sent into them, and where each message was placed
//! in the chat's chunk chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::ChunkError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-sortable).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    /// Unique identifier for a chat.
    ChatId
);
define_id!(
    /// Unique identifier for a registered user.
    UserId
);
define_id!(
    /// Unique identifier for a message.
    MessageId
);
define_id!(
    /// Unique identifier for a message chunk.
    ChunkId
);

/// The kind of content a message carries.
///
/// Closed set: anything else is rejected at parse time. Rich kinds cost more
/// of a chunk's weight budget than plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Media,
    Post,
    Event,
}

impl MessageKind {
    /// All kinds, in declaration order.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Text,
        MessageKind::Media,
        MessageKind::Post,
        MessageKind::Event,
    ];
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Media => write!(f, "media"),
            MessageKind::Post => write!(f, "post"),
            MessageKind::Event => write!(f, "event"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "media" => Ok(MessageKind::Media),
            "post" => Ok(MessageKind::Post),
            "event" => Ok(MessageKind::Event),
            _ => Err(ChunkError::InvalidMessageKind(s.to_string())),
        }
    }
}

/// A registered user. Only the fields messaging needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A chat between two or more users.
///
/// `active_chunk_id` names the chunk that receives the next message. It is
/// `None` until the first message is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub active_chunk_id: Option<ChunkId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message as persisted, after it has been placed into a chunk.
///
/// `chunk_id` is assigned once at placement and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub chunk_id: ChunkId,
    pub created_at: DateTime<Utc>,
}

/// Caller input for a new message. `kind` is raw and parsed by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftMessage {
    pub kind: String,
    pub content: String,
}

impl DraftMessage {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// Where a message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlacement {
    pub chunk_id: ChunkId,
    /// True iff a new chunk was opened to hold this message.
    pub created: bool,
}
