//! Message append service: the entry point the messaging feature calls.
//!
//! MessageAppendService checks the sender against the chat directory,
//! delegates chunk placement to the `ChatChunkCoordinator`, and persists
//! the message row with the chunk it landed in.

use std::collections::HashMap;

use campusnet_types::chat::{ChatId, ChatMessage, DraftMessage, MessageId, MessageKind, UserId};
use campusnet_types::error::{AppendError, RepositoryError};
use chrono::Utc;
use tracing::{info, warn};

use crate::chat::repository::{ChatDirectory, MessageRepository};
use crate::chunk::coordinator::ChatChunkCoordinator;
use crate::chunk::entity::MessageChunk;
use crate::chunk::store::{ChatPointer, ChunkStore};

/// Orchestrates message append, delete, and history reads.
///
/// Generic over the directory, message, and chunk ports to maintain clean
/// architecture (campusnet-core never depends on campusnet-infra).
pub struct MessageAppendService<D, M, S, P>
where
    D: ChatDirectory,
    M: MessageRepository,
    S: ChunkStore,
    P: ChatPointer,
{
    directory: D,
    messages: M,
    coordinator: ChatChunkCoordinator<S, P>,
}

impl<D, M, S, P> MessageAppendService<D, M, S, P>
where
    D: ChatDirectory,
    M: MessageRepository,
    S: ChunkStore,
    P: ChatPointer,
{
    pub fn new(directory: D, messages: M, coordinator: ChatChunkCoordinator<S, P>) -> Self {
        Self {
            directory,
            messages,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &ChatChunkCoordinator<S, P> {
        &self.coordinator
    }

    /// Append a message from `user_id` to `chat_id`.
    ///
    /// Validates the sender and draft, places the message into the chat's
    /// active chunk, then saves the message row referencing that chunk. If the
    /// row cannot be saved the id is dropped from its chunk again.
    pub async fn append_message(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        draft: DraftMessage,
    ) -> Result<ChatMessage, AppendError> {
        self.ensure_member(user_id, chat_id).await?;

        if draft.content.trim().is_empty() {
            return Err(AppendError::EmptyContent);
        }
        let kind: MessageKind = draft.kind.parse()?;

        let message_id = MessageId::new();
        let placement = self
            .coordinator
            .place_message(chat_id, &message_id, kind)
            .await?;

        let message = ChatMessage {
            id: message_id,
            chat_id: *chat_id,
            sender_id: *user_id,
            kind,
            content: draft.content,
            chunk_id: placement.chunk_id,
            created_at: Utc::now(),
        };

        if let Err(e) = self.messages.save_message(&message).await {
            warn!(message_id = %message.id, error = %e, "Message row save failed, dropping from chunk");
            if let Err(drop_err) = self
                .coordinator
                .drop_message(&placement.chunk_id, &message.id, kind)
                .await
            {
                warn!(chunk_id = %placement.chunk_id, error = %drop_err, "Could not drop orphaned message id");
            }
            return Err(e.into());
        }

        info!(
            message_id = %message.id,
            chat_id = %chat_id,
            chunk_id = %placement.chunk_id,
            new_chunk = placement.created,
            "Message appended"
        );
        Ok(message)
    }

    /// Delete a message. Only its sender may do so.
    pub async fn delete_message(
        &self,
        user_id: &UserId,
        message_id: &MessageId,
    ) -> Result<(), AppendError> {
        let message = self
            .messages
            .get_message(message_id)
            .await?
            .ok_or(AppendError::MessageNotFound)?;

        if message.sender_id != *user_id {
            return Err(AppendError::NotSender);
        }

        let found = self
            .coordinator
            .drop_message(&message.chunk_id, &message.id, message.kind)
            .await?;
        if !found {
            warn!(message_id = %message.id, chunk_id = %message.chunk_id, "Message was not in its chunk");
        }

        self.messages
            .delete_message(message_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AppendError::MessageNotFound,
                other => other.into(),
            })?;

        info!(message_id = %message_id, chat_id = %message.chat_id, "Message deleted");
        Ok(())
    }

    /// All messages of a chat in arrival order, read chunk by chunk from
    /// the oldest chunk to the active one.
    pub async fn chat_history(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> Result<Vec<ChatMessage>, AppendError> {
        self.ensure_member(user_id, chat_id).await?;

        let chain = self.coordinator.chain(chat_id).await?;
        let mut history = Vec::new();
        for chunk in chain.iter().rev() {
            let mut rows: HashMap<MessageId, ChatMessage> = self
                .messages
                .list_chunk_messages(&chunk.id)
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect();
            for id in &chunk.message_ids {
                match rows.remove(id) {
                    Some(message) => history.push(message),
                    None => warn!(message_id = %id, chunk_id = %chunk.id, "Chunk references a missing message"),
                }
            }
        }
        Ok(history)
    }

    /// The chat's chunk chain, newest first.
    pub async fn chunk_chain(&self, chat_id: &ChatId) -> Result<Vec<MessageChunk>, AppendError> {
        Ok(self.coordinator.chain(chat_id).await?)
    }

    async fn ensure_member(&self, user_id: &UserId, chat_id: &ChatId) -> Result<(), AppendError> {
        if !self.directory.user_exists(user_id).await? {
            return Err(AppendError::UserNotFound);
        }
        if !self.directory.chat_exists(chat_id).await? {
            return Err(AppendError::ChatNotFound);
        }
        if !self.directory.is_member(chat_id, user_id).await? {
            return Err(AppendError::NotMember);
        }
        Ok(())
    }
}
