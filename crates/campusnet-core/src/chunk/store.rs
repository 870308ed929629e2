//! Persistence ports for chunks and the chat's active-chunk pointer.
//!
//! Implementations live in campusnet-infra (e.g., `SqliteChunkStore`).
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use campusnet_types::chat::{ChatId, ChunkId};
use campusnet_types::error::RepositoryError;

use super::entity::MessageChunk;

/// Durable CRUD for chunk records, keyed by chunk id.
pub trait ChunkStore: Send + Sync {
    /// The chunk the chat's pointer currently names, if any.
    fn get_active(
        &self,
        chat_id: &ChatId,
    ) -> impl std::future::Future<Output = Result<Option<MessageChunk>, RepositoryError>> + Send;

    fn get_by_id(
        &self,
        chunk_id: &ChunkId,
    ) -> impl std::future::Future<Output = Result<Option<MessageChunk>, RepositoryError>> + Send;

    /// Write a single chunk as a compare-and-swap on its version.
    ///
    /// A chunk with `version == 0` is inserted. Any other chunk is updated
    /// only while the stored version still equals `chunk.version`, and the
    /// stored version is bumped. A taken key or a stale version is
    /// `RepositoryError::Conflict` and nothing is written.
    fn save(
        &self,
        chunk: &MessageChunk,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist a freshly linked pair in one atomic write, with the same
    /// version rules as [`ChunkStore::save`] for each chunk.
    fn save_linked(
        &self,
        older: &MessageChunk,
        newer: &MessageChunk,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All chunks of a chat, oldest first.
    fn list_for_chat(
        &self,
        chat_id: &ChatId,
    ) -> impl std::future::Future<Output = Result<Vec<MessageChunk>, RepositoryError>> + Send;
}

/// The chat aggregate's record of which chunk receives the next message.
pub trait ChatPointer: Send + Sync {
    /// Returns `RepositoryError::NotFound` if the chat does not exist.
    fn get_active_chunk_id(
        &self,
        chat_id: &ChatId,
    ) -> impl std::future::Future<Output = Result<Option<ChunkId>, RepositoryError>> + Send;

    /// Move the pointer from `expected` to `chunk_id`.
    ///
    /// Succeeds without change if the pointer already names `chunk_id`.
    /// `RepositoryError::Conflict` if it names anything else, `NotFound` if
    /// the chat does not exist.
    fn set_active_chunk_id(
        &self,
        chat_id: &ChatId,
        expected: Option<&ChunkId>,
        chunk_id: &ChunkId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
