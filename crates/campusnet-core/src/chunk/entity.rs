//! The `MessageChunk` entity and its state transitions.
//!
//! A chunk is **Open** until an add reaches or exceeds its capacity, at which
//! point that add is still accepted and the chunk becomes **Full**. Full is
//! terminal for additions. Removing a message never re-opens a chunk.

use campusnet_types::chat::{ChatId, ChunkId, MessageId, MessageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::ChunkSizingPolicy;

/// Bounded, ordered collection of message ids belonging to one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageChunk {
    pub id: ChunkId,
    pub chat_id: ChatId,
    /// Arrival order.
    pub message_ids: Vec<MessageId>,
    pub capacity_weight: u32,
    pub current_weight: u32,
    pub is_full: bool,
    /// The chunk that was active before this one was opened.
    pub previous_chunk_id: Option<ChunkId>,
    /// The chunk opened after this one filled up.
    pub next_chunk_id: Option<ChunkId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stored revision this copy was read at. Zero until first stored.
    #[serde(default)]
    pub version: u64,
}

/// Result of [`MessageChunk::try_add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The message was appended. `is_full` is the chunk's state afterwards.
    Added { is_full: bool },
    /// The chunk was already full; nothing changed.
    Rejected,
}

/// Result of [`MessageChunk::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

impl MessageChunk {
    /// Create an empty, open, unlinked chunk for a chat.
    pub fn create(chat_id: ChatId, capacity_weight: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ChunkId::new(),
            chat_id,
            message_ids: Vec::new(),
            capacity_weight,
            current_weight: 0,
            is_full: false,
            previous_chunk_id: None,
            next_chunk_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Create the chat's first chunk.
    ///
    /// Its id is derived from the chat id, so two writers opening a chat's
    /// first chunk at the same time collide on the key instead of both
    /// succeeding.
    pub fn first_for(chat_id: ChatId, capacity_weight: u32) -> Self {
        Self {
            id: Self::first_id(&chat_id),
            ..Self::create(chat_id, capacity_weight)
        }
    }

    /// Id of the chat's first chunk.
    pub fn first_id(chat_id: &ChatId) -> ChunkId {
        ChunkId::from_uuid(chat_id.0)
    }

    /// Append a message unless the chunk is already full.
    ///
    /// The add that reaches or crosses capacity is accepted and seals the
    /// chunk, so `current_weight` may end up above `capacity_weight` by less
    /// than one message's weight.
    pub fn try_add(
        &mut self,
        message_id: MessageId,
        kind: MessageKind,
        policy: &ChunkSizingPolicy,
    ) -> AddOutcome {
        if self.is_full {
            return AddOutcome::Rejected;
        }

        let fills = policy.would_fill(self.current_weight, self.capacity_weight, kind);
        self.current_weight = self.current_weight.saturating_add(policy.weight_of(kind));
        self.message_ids.push(message_id);
        if fills {
            self.is_full = true;
        }
        self.updated_at = Utc::now();

        AddOutcome::Added {
            is_full: self.is_full,
        }
    }

    /// Remove a message id and give back its weight. Does not clear `is_full`.
    pub fn remove(
        &mut self,
        message_id: &MessageId,
        kind: MessageKind,
        policy: &ChunkSizingPolicy,
    ) -> RemoveOutcome {
        let Some(pos) = self.message_ids.iter().position(|id| id == message_id) else {
            return RemoveOutcome::NotFound;
        };

        self.message_ids.remove(pos);
        self.current_weight = self.current_weight.saturating_sub(policy.weight_of(kind));
        self.updated_at = Utc::now();
        RemoveOutcome::Removed
    }

    /// Link this (new) chunk after `previous`, setting both directions.
    ///
    /// Both chunks must be persisted together afterwards.
    pub fn link_as_newer(&mut self, previous: &mut MessageChunk) {
        let now = Utc::now();
        self.previous_chunk_id = Some(previous.id);
        self.updated_at = now;
        previous.next_chunk_id = Some(self.id);
        previous.updated_at = now;
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.message_ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }
}
