//! Chat chunk coordinator: places messages into a chat's active chunk.
//!
//! For each incoming message the coordinator finds (or opens) the chat's
//! active chunk, appends the message, and rolls over to a new linked chunk
//! when the active one is already full.
//!
//! Writers in this process take the chat's lock. Writers in other processes
//! are caught by the store: every chunk write is a compare-and-swap on the
//! chunk's version and every pointer move is a compare-and-set, so a lost
//! race surfaces as `RepositoryError::Conflict` and the whole round is
//! re-read and retried. A round writes exactly one chunk record (or one
//! linked pair) before the pointer moves, and a pointer left behind by a
//! crash is caught up from the chunks' `next_chunk_id` links.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use campusnet_types::chat::{ChatId, ChunkId, ChunkPlacement, MessageId, MessageKind};
use campusnet_types::config::ChunkingConfig;
use campusnet_types::error::{ChunkError, RepositoryError};
use tracing::{debug, error, info, warn};

use super::entity::{AddOutcome, MessageChunk, RemoveOutcome};
use super::lock::ChatLocks;
use super::policy::ChunkSizingPolicy;
use super::store::{ChatPointer, ChunkStore};

/// Base delay between persistence attempts; multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Base delay before re-reading after a lost race; multiplied by the attempt number.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(5);

/// Cap on the conflict backoff multiplier.
const MAX_CONFLICT_STEPS: u32 = 8;

/// Orchestrates chunk placement for chats.
///
/// Generic over `ChunkStore` and `ChatPointer` to maintain clean architecture
/// (campusnet-core never depends on campusnet-infra).
pub struct ChatChunkCoordinator<S: ChunkStore, P: ChatPointer> {
    store: S,
    pointer: P,
    policy: ChunkSizingPolicy,
    locks: ChatLocks,
    persist_attempts: u32,
    conflict_attempts: u32,
}

/// Why one read-modify-write round did not finish.
#[derive(Debug)]
enum RoundError {
    /// Another writer changed the chunk or pointer first. Nothing was written.
    Stale(RepositoryError),
    Failed(ChunkError),
}

impl From<ChunkError> for RoundError {
    fn from(e: ChunkError) -> Self {
        RoundError::Failed(e)
    }
}

/// The newest chunk of a chat, and what the chat's pointer names.
struct Head {
    pointer: Option<ChunkId>,
    chunk: MessageChunk,
}

impl<S: ChunkStore, P: ChatPointer> ChatChunkCoordinator<S, P> {
    pub fn new(store: S, pointer: P, config: ChunkingConfig) -> Self {
        let persist_attempts = config.persist_attempts.max(1);
        let conflict_attempts = config.conflict_attempts.max(1);
        Self {
            store,
            pointer,
            policy: ChunkSizingPolicy::new(config),
            locks: ChatLocks::new(),
            persist_attempts,
            conflict_attempts,
        }
    }

    /// Place a message into the chat's active chunk.
    ///
    /// 1. Loads the chat's active chunk, opening the first one if the chat has none.
    /// 2. Appends the message. An add that reaches capacity is accepted and seals the chunk.
    /// 3. If the active chunk was already full, opens a new chunk linked to it,
    ///    stores the pair, and repoints the chat.
    ///
    /// `created` is true iff a chunk was opened during this call.
    #[tracing::instrument(
        name = "place_message",
        skip_all,
        fields(chat_id = %chat_id, message_id = %message_id, kind = %kind)
    )]
    pub async fn place_message(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        kind: MessageKind,
    ) -> Result<ChunkPlacement, ChunkError> {
        let weight = self.policy.check_fits_empty_chunk(kind)?;

        let _guard = self.locks.acquire(*chat_id).await;

        self.in_rounds("place_message", || {
            self.place_once(chat_id, message_id, kind, weight)
        })
        .await
    }

    /// Remove a message id from a chunk. Returns whether it was present.
    pub async fn drop_message(
        &self,
        chunk_id: &ChunkId,
        message_id: &MessageId,
        kind: MessageKind,
    ) -> Result<bool, ChunkError> {
        let chat_id = self.load_chunk(chunk_id).await?.chat_id;

        let _guard = self.locks.acquire(chat_id).await;

        self.in_rounds("drop_message", || self.drop_once(chunk_id, message_id, kind))
            .await
    }

    /// The chat's chunks from newest (active) to oldest, following
    /// `previous_chunk_id` links.
    pub async fn chain(&self, chat_id: &ChatId) -> Result<Vec<MessageChunk>, ChunkError> {
        let Some(head) = self.locate_head(chat_id).await? else {
            return Ok(Vec::new());
        };

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(head.chunk);
        while let Some(chunk) = current {
            if !seen.insert(chunk.id) {
                return Err(ChunkError::CorruptChain(format!("cycle at chunk {}", chunk.id)));
            }
            if chunk.chat_id != *chat_id {
                return Err(ChunkError::CorruptChain(format!(
                    "chunk {} belongs to chat {}",
                    chunk.id, chunk.chat_id
                )));
            }
            current = match chunk.previous_chunk_id {
                Some(id) => Some(self.load_chunk(&id).await?),
                None => None,
            };
            chain.push(chunk);
        }

        Ok(chain)
    }

    /// Chunks stored for the chat that its chain does not reach.
    ///
    /// Empty for a healthy chat.
    pub async fn unreachable_chunks(&self, chat_id: &ChatId) -> Result<Vec<ChunkId>, ChunkError> {
        let reachable: HashSet<ChunkId> = self.chain(chat_id).await?.iter().map(|c| c.id).collect();
        let stored = self
            .store
            .list_for_chat(chat_id)
            .await
            .map_err(read_error)?;
        Ok(stored
            .into_iter()
            .map(|c| c.id)
            .filter(|id| !reachable.contains(id))
            .collect())
    }

    async fn place_once(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        kind: MessageKind,
        weight: u32,
    ) -> Result<ChunkPlacement, RoundError> {
        let Some(head) = self.locate_head(chat_id).await? else {
            return self.open_first_chunk(chat_id, message_id, kind, weight).await;
        };

        let mut chunk = head.chunk;
        if head.pointer != Some(chunk.id) {
            debug!(chunk_id = %chunk.id, "Active pointer is behind the chain, catching up");
            self.persist("set_active_chunk_id", || {
                self.pointer
                    .set_active_chunk_id(chat_id, head.pointer.as_ref(), &chunk.id)
            })
            .await?;
        }

        match chunk.try_add(*message_id, kind, &self.policy) {
            AddOutcome::Added { is_full } => {
                self.persist("save", || self.store.save(&chunk)).await?;
                debug!(chunk_id = %chunk.id, weight, is_full, "Message added to active chunk");
                Ok(ChunkPlacement {
                    chunk_id: chunk.id,
                    created: false,
                })
            }
            AddOutcome::Rejected => {
                let mut fresh = MessageChunk::create(*chat_id, self.policy.capacity_weight());
                fresh.link_as_newer(&mut chunk);
                self.seed(&mut fresh, message_id, kind, weight)?;
                self.persist("save_linked", || self.store.save_linked(&chunk, &fresh))
                    .await?;
                info!(
                    previous_chunk_id = %chunk.id,
                    chunk_id = %fresh.id,
                    "Active chunk full, rolled over to new chunk"
                );
                self.settle_pointer(chat_id, Some(&chunk.id), &fresh.id).await;
                Ok(ChunkPlacement {
                    chunk_id: fresh.id,
                    created: true,
                })
            }
        }
    }

    /// Open the chat's first chunk holding the message.
    ///
    /// A concurrent opener makes the insert conflict on the shared first id,
    /// and the round is retried against its chunk.
    async fn open_first_chunk(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        kind: MessageKind,
        weight: u32,
    ) -> Result<ChunkPlacement, RoundError> {
        let mut chunk = MessageChunk::first_for(*chat_id, self.policy.capacity_weight());
        self.seed(&mut chunk, message_id, kind, weight)?;
        self.persist("save", || self.store.save(&chunk)).await?;
        info!(chunk_id = %chunk.id, "Opened first chunk for chat");
        self.settle_pointer(chat_id, None, &chunk.id).await;
        Ok(ChunkPlacement {
            chunk_id: chunk.id,
            created: true,
        })
    }

    async fn drop_once(
        &self,
        chunk_id: &ChunkId,
        message_id: &MessageId,
        kind: MessageKind,
    ) -> Result<bool, RoundError> {
        let mut chunk = self.load_chunk(chunk_id).await?;
        match chunk.remove(message_id, kind, &self.policy) {
            RemoveOutcome::Removed => {
                self.persist("save", || self.store.save(&chunk)).await?;
                debug!(chunk_id = %chunk_id, message_id = %message_id, "Message dropped from chunk");
                Ok(true)
            }
            RemoveOutcome::NotFound => Ok(false),
        }
    }

    /// Find the chat's newest chunk: the active chunk, then any newer chunks
    /// its `next_chunk_id` links reach. `None` if the chat has no chunks.
    async fn locate_head(&self, chat_id: &ChatId) -> Result<Option<Head>, ChunkError> {
        let (pointer, mut chunk) = match self.store.get_active(chat_id).await.map_err(read_error)? {
            Some(chunk) => (Some(chunk.id), chunk),
            None => {
                // Missing chat, no chunk yet, or a pointer that was never set
                // after the first chunk was stored.
                let pointer = self
                    .pointer
                    .get_active_chunk_id(chat_id)
                    .await
                    .map_err(chat_lookup_error)?;
                let start = pointer.unwrap_or_else(|| MessageChunk::first_id(chat_id));
                match self.store.get_by_id(&start).await.map_err(read_error)? {
                    Some(chunk) => (pointer, chunk),
                    None if pointer.is_none() => return Ok(None),
                    None => return Err(ChunkError::ChunkNotFound),
                }
            }
        };

        let mut seen = HashSet::from([chunk.id]);
        while let Some(next_id) = chunk.next_chunk_id {
            if !seen.insert(next_id) {
                return Err(ChunkError::CorruptChain(format!("cycle at chunk {next_id}")));
            }
            let next = self.load_chunk(&next_id).await?;
            if next.chat_id != *chat_id {
                return Err(ChunkError::CorruptChain(format!(
                    "chunk {next_id} belongs to chat {}",
                    next.chat_id
                )));
            }
            chunk = next;
        }

        Ok(Some(Head { pointer, chunk }))
    }

    async fn load_chunk(&self, chunk_id: &ChunkId) -> Result<MessageChunk, ChunkError> {
        self.store
            .get_by_id(chunk_id)
            .await
            .map_err(read_error)?
            .ok_or(ChunkError::ChunkNotFound)
    }

    /// Append to a chunk that has never been stored.
    fn seed(
        &self,
        chunk: &mut MessageChunk,
        message_id: &MessageId,
        kind: MessageKind,
        weight: u32,
    ) -> Result<(), ChunkError> {
        match chunk.try_add(*message_id, kind, &self.policy) {
            AddOutcome::Added { is_full } => {
                debug!(chunk_id = %chunk.id, weight, is_full, "Message added to new chunk");
                Ok(())
            }
            AddOutcome::Rejected => Err(ChunkError::MessageTooLarge {
                weight,
                capacity: chunk.capacity_weight,
            }),
        }
    }

    /// Point the chat at a chunk that already holds the message.
    ///
    /// The message is durable at this point, so a failure here is only
    /// logged: the next read catches the pointer up through `next_chunk_id`,
    /// or through the first chunk's fixed id.
    async fn settle_pointer(&self, chat_id: &ChatId, expected: Option<&ChunkId>, chunk_id: &ChunkId) {
        let moved = self
            .persist("set_active_chunk_id", || {
                self.pointer.set_active_chunk_id(chat_id, expected, chunk_id)
            })
            .await;
        match moved {
            Ok(()) => {}
            Err(RoundError::Stale(e)) => {
                debug!(chunk_id = %chunk_id, error = %e, "Active pointer already moved on");
            }
            Err(RoundError::Failed(e)) => {
                warn!(chunk_id = %chunk_id, error = %e, "Could not move active pointer, leaving it behind");
            }
        }
    }

    /// Run read-modify-write rounds until one completes, re-reading after
    /// each lost race.
    async fn in_rounds<T, F, Fut>(&self, op: &'static str, mut round: F) -> Result<T, ChunkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RoundError>>,
    {
        let mut attempt = 1;
        loop {
            match round().await {
                Ok(value) => return Ok(value),
                Err(RoundError::Failed(e)) => return Err(e),
                Err(RoundError::Stale(e)) if attempt < self.conflict_attempts => {
                    debug!(op, attempt, error = %e, "Lost a concurrent update, re-reading");
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt.min(MAX_CONFLICT_STEPS)).await;
                    attempt += 1;
                }
                Err(RoundError::Stale(e)) => {
                    error!(op, attempt, error = %e, "Gave up after repeated concurrent updates");
                    return Err(ChunkError::ChunkPersistenceFailure(e.to_string()));
                }
            }
        }
    }

    /// Run a chunk write, retrying transient failures with linear backoff.
    ///
    /// A `Conflict` ends the round at once; anything else non-transient is
    /// a persistence failure after a single attempt.
    async fn persist<F, Fut>(&self, op: &'static str, mut write: F) -> Result<(), RoundError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), RepositoryError>>,
    {
        let mut attempt = 1;
        loop {
            match write().await {
                Ok(()) => return Ok(()),
                Err(e @ RepositoryError::Conflict(_)) => return Err(RoundError::Stale(e)),
                Err(e) if e.is_transient() && attempt < self.persist_attempts => {
                    warn!(op, attempt, error = %e, "Chunk write failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(op, attempt, error = %e, "Chunk write failed");
                    return Err(RoundError::Failed(ChunkError::ChunkPersistenceFailure(
                        e.to_string(),
                    )));
                }
            }
        }
    }
}

fn chat_lookup_error(e: RepositoryError) -> ChunkError {
    match e {
        RepositoryError::NotFound => ChunkError::ChatNotFound,
        other => ChunkError::ChunkPersistenceFailure(other.to_string()),
    }
}

fn read_error(e: RepositoryError) -> ChunkError {
    ChunkError::ChunkPersistenceFailure(e.to_string())
}
