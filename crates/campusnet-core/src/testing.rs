//! In-memory fakes of the repository ports for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use campusnet_types::chat::{ChatId, ChatMessage, ChunkId, MessageId, UserId};
use campusnet_types::error::RepositoryError;

use crate::chat::repository::{ChatDirectory, MessageRepository};
use crate::chunk::entity::MessageChunk;
use crate::chunk::store::{ChatPointer, ChunkStore};

#[derive(Default)]
struct ChunkState {
    chunks: HashMap<ChunkId, MessageChunk>,
    /// chat -> active chunk pointer
    chats: HashMap<ChatId, Option<ChunkId>>,
}

#[derive(Clone, Default)]
pub struct InMemoryChunkStore {
    state: Arc<Mutex<ChunkState>>,
    failing_saves: Arc<AtomicU32>,
    rejecting_saves: Arc<AtomicU32>,
    conflicting_saves: Arc<AtomicU32>,
    save_attempts: Arc<AtomicU32>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a transient error.
    pub fn fail_next_saves(&self, n: u32) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail with a constraint violation.
    pub fn reject_next_saves(&self, n: u32) {
        self.rejecting_saves.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes lose to a concurrent writer.
    pub fn conflict_next_saves(&self, n: u32) {
        self.conflicting_saves.store(n, Ordering::SeqCst);
    }

    /// Chunk writes attempted so far, failed ones included.
    pub fn save_attempts(&self) -> u32 {
        self.save_attempts.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Result<(), RepositoryError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_saves) {
            return Err(RepositoryError::Busy("database is locked".to_string()));
        }
        if take_one(&self.rejecting_saves) {
            return Err(RepositoryError::Constraint("FOREIGN KEY constraint failed".to_string()));
        }
        if take_one(&self.conflicting_saves) {
            return Err(RepositoryError::Conflict("chunk was updated concurrently".to_string()));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Same version rules as the SQLite store: insert at zero, otherwise the
/// stored version must match.
fn check_version(
    chunks: &HashMap<ChunkId, MessageChunk>,
    chunk: &MessageChunk,
) -> Result<(), RepositoryError> {
    match (chunks.get(&chunk.id), chunk.version) {
        (Some(_), 0) => Err(RepositoryError::Conflict(format!("chunk {} already exists", chunk.id))),
        (None, 0) => Ok(()),
        (None, _) => Err(RepositoryError::NotFound),
        (Some(stored), v) if stored.version != v => {
            Err(RepositoryError::Conflict(format!("chunk {} is stale", chunk.id)))
        }
        (Some(_), _) => Ok(()),
    }
}

fn stored(chunk: &MessageChunk) -> MessageChunk {
    MessageChunk {
        version: chunk.version + 1,
        ..chunk.clone()
    }
}

impl ChunkStore for InMemoryChunkStore {
    async fn get_active(&self, chat_id: &ChatId) -> Result<Option<MessageChunk>, RepositoryError> {
        // Give concurrent writers a chance to interleave between read and write.
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .chats
            .get(chat_id)
            .copied()
            .flatten()
            .and_then(|id| state.chunks.get(&id).cloned()))
    }

    async fn get_by_id(&self, chunk_id: &ChunkId) -> Result<Option<MessageChunk>, RepositoryError> {
        Ok(self.state.lock().unwrap().chunks.get(chunk_id).cloned())
    }

    async fn save(&self, chunk: &MessageChunk) -> Result<(), RepositoryError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        check_version(&state.chunks, chunk)?;
        state.chunks.insert(chunk.id, stored(chunk));
        Ok(())
    }

    async fn save_linked(
        &self,
        older: &MessageChunk,
        newer: &MessageChunk,
    ) -> Result<(), RepositoryError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        check_version(&state.chunks, older)?;
        check_version(&state.chunks, newer)?;
        state.chunks.insert(older.id, stored(older));
        state.chunks.insert(newer.id, stored(newer));
        Ok(())
    }

    async fn list_for_chat(&self, chat_id: &ChatId) -> Result<Vec<MessageChunk>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut chunks: Vec<MessageChunk> = state
            .chunks
            .values()
            .filter(|c| c.chat_id == *chat_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.id);
        Ok(chunks)
    }
}

/// Pointer fake sharing state with an `InMemoryChunkStore`.
#[derive(Clone)]
pub struct InMemoryChatPointer {
    state: Arc<Mutex<ChunkState>>,
}

impl InMemoryChatPointer {
    pub fn new(store: InMemoryChunkStore) -> Self {
        Self { state: store.state }
    }

    pub fn add_chat(&self, chat_id: ChatId) {
        self.state.lock().unwrap().chats.insert(chat_id, None);
    }
}

impl ChatPointer for InMemoryChatPointer {
    async fn get_active_chunk_id(&self, chat_id: &ChatId) -> Result<Option<ChunkId>, RepositoryError> {
        self.state
            .lock()
            .unwrap()
            .chats
            .get(chat_id)
            .copied()
            .ok_or(RepositoryError::NotFound)
    }

    async fn set_active_chunk_id(
        &self,
        chat_id: &ChatId,
        expected: Option<&ChunkId>,
        chunk_id: &ChunkId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let active = state.chats.get_mut(chat_id).ok_or(RepositoryError::NotFound)?;
        if *active == Some(*chunk_id) || active.as_ref() == expected {
            *active = Some(*chunk_id);
            return Ok(());
        }
        Err(RepositoryError::Conflict("active chunk pointer moved".to_string()))
    }
}

#[derive(Default)]
struct DirectoryState {
    users: HashSet<UserId>,
    chats: HashSet<ChatId>,
    members: HashSet<(ChatId, UserId)>,
}

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: UserId) {
        self.state.lock().unwrap().users.insert(user_id);
    }

    pub fn add_chat(&self, chat_id: ChatId) {
        self.state.lock().unwrap().chats.insert(chat_id);
    }

    pub fn add_member(&self, chat_id: ChatId, user_id: UserId) {
        self.state.lock().unwrap().members.insert((chat_id, user_id));
    }
}

impl ChatDirectory for InMemoryDirectory {
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().unwrap().users.contains(user_id))
    }

    async fn chat_exists(&self, chat_id: &ChatId) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().unwrap().chats.contains(chat_id))
    }

    async fn is_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .contains(&(*chat_id, *user_id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMessageRepository {
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl MessageRepository for InMemoryMessageRepository {
    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn get_message(&self, message_id: &MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == *message_id)
            .cloned())
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|m| m.id != *message_id);
        if messages.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_chunk_messages(&self, chunk_id: &ChunkId) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chunk_id == *chunk_id)
            .cloned()
            .collect())
    }
}
