//! ChatDirectory and MessageRepository trait definitions.
//!
//! Membership checks and message-row persistence consumed by the append
//! service. Follows the same RPITIT pattern as `ChunkStore`.

use campusnet_types::chat::{ChatId, ChatMessage, ChunkId, MessageId, UserId};
use campusnet_types::error::RepositoryError;

/// Read-only view of users, chats, and chat membership.
pub trait ChatDirectory: Send + Sync {
    fn user_exists(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn chat_exists(
        &self,
        chat_id: &ChatId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn is_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Repository trait for placed message rows.
///
/// Implementations live in campusnet-infra (e.g., `SqliteMessageRepository`).
pub trait MessageRepository: Send + Sync {
    /// Save a message that has already been placed into a chunk.
    fn save_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_message(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Delete a message row. `RepositoryError::NotFound` if absent.
    fn delete_message(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Messages placed into one chunk, ordered by created_at ASC.
    fn list_chunk_messages(
        &self,
        chunk_id: &ChunkId,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;
}
