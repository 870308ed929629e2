//! SQLite chunk store implementation.
//!
//! Implements `ChunkStore` from `campusnet-core`. Message ids are stored as a
//! JSON array in `message_chunks.message_ids`, in arrival order.
//!
//! Every write is conditional on `message_chunks.version`, so writers in
//! separate processes sharing the database file cannot overwrite each
//! other's changes.

use campusnet_core::chunk::entity::MessageChunk;
use campusnet_core::chunk::store::ChunkStore;
use campusnet_types::chat::{ChatId, ChunkId, MessageId};
use campusnet_types::error::RepositoryError;
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

const INSERT_CHUNK: &str = "INSERT INTO message_chunks
        (id, chat_id, message_ids, capacity_weight, current_weight, is_full, previous_chunk_id, next_chunk_id, created_at, updated_at, version)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)";

const UPDATE_CHUNK: &str = "UPDATE message_chunks SET
        message_ids = ?,
        current_weight = ?,
        is_full = ?,
        previous_chunk_id = ?,
        next_chunk_id = ?,
        updated_at = ?,
        version = version + 1
     WHERE id = ? AND version = ?";

/// SQLite-backed implementation of `ChunkStore`.
#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: DatabasePool,
}

impl SqliteChunkStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to `MessageChunk`.
struct ChunkRow {
    id: String,
    chat_id: String,
    message_ids: String,
    capacity_weight: i64,
    current_weight: i64,
    is_full: bool,
    previous_chunk_id: Option<String>,
    next_chunk_id: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl ChunkRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            message_ids: row.try_get("message_ids")?,
            capacity_weight: row.try_get("capacity_weight")?,
            current_weight: row.try_get("current_weight")?,
            is_full: row.try_get("is_full")?,
            previous_chunk_id: row.try_get("previous_chunk_id")?,
            next_chunk_id: row.try_get("next_chunk_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }

    fn into_chunk(self) -> Result<MessageChunk, RepositoryError> {
        let message_ids: Vec<MessageId> = serde_json::from_str(&self.message_ids)
            .map_err(|e| RepositoryError::Query(format!("invalid message_ids JSON: {e}")))?;
        let chunk_ref = |s: Option<String>| -> Result<Option<ChunkId>, RepositoryError> {
            s.as_deref()
                .map(|s| parse_uuid(s, "chunk id").map(ChunkId::from_uuid))
                .transpose()
        };

        Ok(MessageChunk {
            id: ChunkId::from_uuid(parse_uuid(&self.id, "chunk id")?),
            chat_id: ChatId::from_uuid(parse_uuid(&self.chat_id, "chat id")?),
            message_ids,
            capacity_weight: to_weight(self.capacity_weight)?,
            current_weight: to_weight(self.current_weight)?,
            is_full: self.is_full,
            previous_chunk_id: chunk_ref(self.previous_chunk_id)?,
            next_chunk_id: chunk_ref(self.next_chunk_id)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            version: u64::try_from(self.version)
                .map_err(|_| RepositoryError::Query(format!("invalid version: {}", self.version)))?,
        })
    }
}

fn to_weight(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Query(format!("invalid weight: {value}")))
}

/// Insert a never-stored chunk, or update a stored one if its version
/// still matches. Runs on the caller's connection so a transaction can
/// cover several chunks.
async fn write_chunk(conn: &mut SqliteConnection, chunk: &MessageChunk) -> Result<(), RepositoryError> {
    let ids_json = serde_json::to_string(&chunk.message_ids)
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    if chunk.version == 0 {
        sqlx::query(INSERT_CHUNK)
            .bind(chunk.id.to_string())
            .bind(chunk.chat_id.to_string())
            .bind(ids_json)
            .bind(i64::from(chunk.capacity_weight))
            .bind(i64::from(chunk.current_weight))
            .bind(chunk.is_full)
            .bind(chunk.previous_chunk_id.map(|id| id.to_string()))
            .bind(chunk.next_chunk_id.map(|id| id.to_string()))
            .bind(format_datetime(&chunk.created_at))
            .bind(format_datetime(&chunk.updated_at))
            .execute(&mut *conn)
            .await
            .map_err(query_error)?;
        return Ok(());
    }

    let expected = i64::try_from(chunk.version)
        .map_err(|_| RepositoryError::Query(format!("invalid version: {}", chunk.version)))?;
    let result = sqlx::query(UPDATE_CHUNK)
        .bind(ids_json)
        .bind(i64::from(chunk.current_weight))
        .bind(chunk.is_full)
        .bind(chunk.previous_chunk_id.map(|id| id.to_string()))
        .bind(chunk.next_chunk_id.map(|id| id.to_string()))
        .bind(format_datetime(&chunk.updated_at))
        .bind(chunk.id.to_string())
        .bind(expected)
        .execute(&mut *conn)
        .await
        .map_err(query_error)?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let exists = sqlx::query("SELECT 1 FROM message_chunks WHERE id = ?")
        .bind(chunk.id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_error)?;
    match exists {
        Some(_) => Err(RepositoryError::Conflict(format!(
            "chunk {} changed since version {}",
            chunk.id, chunk.version
        ))),
        None => Err(RepositoryError::NotFound),
    }
}

fn rows_to_chunks(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<MessageChunk>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ChunkRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_chunk()
        })
        .collect()
}

impl ChunkStore for SqliteChunkStore {
    async fn get_active(&self, chat_id: &ChatId) -> Result<Option<MessageChunk>, RepositoryError> {
        let row = sqlx::query(
            "SELECT mc.* FROM message_chunks mc
             JOIN chats c ON c.active_chunk_id = mc.id
             WHERE c.id = ?",
        )
        .bind(chat_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let chunk_row =
                    ChunkRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(chunk_row.into_chunk()?))
            }
            None => Ok(None),
        }
    }

    async fn get_by_id(&self, chunk_id: &ChunkId) -> Result<Option<MessageChunk>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM message_chunks WHERE id = ?")
            .bind(chunk_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let chunk_row =
                    ChunkRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(chunk_row.into_chunk()?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, chunk: &MessageChunk) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        write_chunk(&mut conn, chunk).await
    }

    async fn save_linked(
        &self,
        older: &MessageChunk,
        newer: &MessageChunk,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        // Dropping the transaction on error rolls both writes back.
        write_chunk(&mut tx, older).await?;
        write_chunk(&mut tx, newer).await?;

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn list_for_chat(&self, chat_id: &ChatId) -> Result<Vec<MessageChunk>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM message_chunks WHERE chat_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_chunks(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use campusnet_core::chunk::coordinator::ChatChunkCoordinator;
    use campusnet_core::chunk::policy::ChunkSizingPolicy;
    use campusnet_core::chunk::store::ChatPointer;
    use campusnet_types::chat::{Chat, MessageKind};
    use campusnet_types::config::ChunkingConfig;
    use campusnet_types::error::ChunkError;
    use chrono::Utc;

    use crate::sqlite::chat::SqliteChatRepository;
    use crate::sqlite::pool::test_support::{second_pool, temp_pool};

    async fn setup() -> (tempfile::TempDir, SqliteChunkStore, SqliteChatRepository, ChatId) {
        let (dir, pool) = temp_pool().await;
        let chats = SqliteChatRepository::new(pool.clone());
        let now = Utc::now();
        let chat = Chat {
            id: ChatId::new(),
            name: "study group".to_string(),
            active_chunk_id: None,
            created_at: now,
            updated_at: now,
        };
        chats.create_chat(&chat, &[]).await.unwrap();
        (dir, SqliteChunkStore::new(pool), chats, chat.id)
    }

    #[tokio::test]
    async fn save_and_get_by_id() {
        let (_dir, store, _chats, chat_id) = setup().await;
        let policy = ChunkSizingPolicy::default();

        let mut chunk = MessageChunk::create(chat_id, 50);
        let first = MessageId::new();
        let second = MessageId::new();
        chunk.try_add(first, MessageKind::Text, &policy);
        chunk.try_add(second, MessageKind::Media, &policy);
        store.save(&chunk).await.unwrap();

        let loaded = store.get_by_id(&chunk.id).await.unwrap().unwrap();
        assert_eq!(loaded.message_ids, vec![first, second]);
        assert_eq!(loaded.current_weight, 11);
        assert!(!loaded.is_full);
        assert_eq!(loaded.capacity_weight, 50);
        assert_eq!(loaded.version, 1);

        assert!(store.get_by_id(&ChunkId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_updates_a_fresh_copy() {
        let (_dir, store, _chats, chat_id) = setup().await;
        let policy = ChunkSizingPolicy::default();

        let chunk = MessageChunk::create(chat_id, 50);
        store.save(&chunk).await.unwrap();
        let mut chunk = store.get_by_id(&chunk.id).await.unwrap().unwrap();
        for _ in 0..5 {
            chunk.try_add(MessageId::new(), MessageKind::Event, &policy);
        }
        store.save(&chunk).await.unwrap();

        let loaded = store.get_by_id(&chunk.id).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.current_weight, 50);
        assert!(loaded.is_full);
        assert_eq!(loaded.version, 2);
        assert_eq!(store.list_for_chat(&chat_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_copy_conflicts_and_changes_nothing() {
        let (_dir, store, _chats, chat_id) = setup().await;
        let policy = ChunkSizingPolicy::default();

        let chunk = MessageChunk::create(chat_id, 50);
        store.save(&chunk).await.unwrap();
        let mut mine = store.get_by_id(&chunk.id).await.unwrap().unwrap();
        let mut theirs = mine.clone();

        let kept = MessageId::new();
        theirs.try_add(kept, MessageKind::Text, &policy);
        store.save(&theirs).await.unwrap();

        mine.try_add(MessageId::new(), MessageKind::Text, &policy);
        let err = store.save(&mine).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(!err.is_transient());

        let loaded = store.get_by_id(&chunk.id).await.unwrap().unwrap();
        assert_eq!(loaded.message_ids, vec![kept]);
    }

    #[tokio::test]
    async fn inserting_a_taken_id_conflicts() {
        let (_dir, store, _chats, chat_id) = setup().await;
        let chunk = MessageChunk::first_for(chat_id, 50);
        store.save(&chunk).await.unwrap();

        let again = MessageChunk::first_for(chat_id, 50);
        let err = store.save(&again).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn updating_a_missing_chunk_is_not_found() {
        let (_dir, store, _chats, chat_id) = setup().await;
        let mut ghost = MessageChunk::create(chat_id, 50);
        ghost.version = 3;
        assert!(matches!(
            store.save(&ghost).await.unwrap_err(),
            RepositoryError::NotFound
        ));
    }

    #[tokio::test]
    async fn save_linked_persists_both_directions() {
        let (_dir, store, _chats, chat_id) = setup().await;

        let older = MessageChunk::create(chat_id, 50);
        store.save(&older).await.unwrap();
        let mut older = store.get_by_id(&older.id).await.unwrap().unwrap();
        let mut newer = MessageChunk::create(chat_id, 50);
        newer.link_as_newer(&mut older);
        store.save_linked(&older, &newer).await.unwrap();

        let older_loaded = store.get_by_id(&older.id).await.unwrap().unwrap();
        let newer_loaded = store.get_by_id(&newer.id).await.unwrap().unwrap();
        assert_eq!(older_loaded.next_chunk_id, Some(newer.id));
        assert_eq!(newer_loaded.previous_chunk_id, Some(older.id));

        let listed = store.list_for_chat(&chat_id).await.unwrap();
        let ids: Vec<ChunkId> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn save_linked_with_stale_older_writes_neither() {
        let (_dir, store, _chats, chat_id) = setup().await;
        let policy = ChunkSizingPolicy::default();

        let older = MessageChunk::create(chat_id, 50);
        store.save(&older).await.unwrap();
        let mut stale = store.get_by_id(&older.id).await.unwrap().unwrap();
        let mut current = stale.clone();
        current.try_add(MessageId::new(), MessageKind::Text, &policy);
        store.save(&current).await.unwrap();

        let mut newer = MessageChunk::create(chat_id, 50);
        newer.link_as_newer(&mut stale);
        let err = store.save_linked(&stale, &newer).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        assert!(store.get_by_id(&newer.id).await.unwrap().is_none());
        let loaded = store.get_by_id(&older.id).await.unwrap().unwrap();
        assert!(loaded.next_chunk_id.is_none());
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn get_active_follows_chat_pointer() {
        let (_dir, store, chats, chat_id) = setup().await;
        assert!(store.get_active(&chat_id).await.unwrap().is_none());

        let chunk = MessageChunk::create(chat_id, 50);
        store.save(&chunk).await.unwrap();
        assert!(
            store.get_active(&chat_id).await.unwrap().is_none(),
            "an unreferenced chunk is not active"
        );

        chats.set_active_chunk_id(&chat_id, None, &chunk.id).await.unwrap();
        let active = store.get_active(&chat_id).await.unwrap().unwrap();
        assert_eq!(active.id, chunk.id);
    }

    #[tokio::test]
    async fn chunk_for_unknown_chat_is_a_permanent_failure() {
        let (_dir, store, _chats, _chat_id) = setup().await;
        let orphan = MessageChunk::create(ChatId::new(), 50);
        let err = store.save(&orphan).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint(_)), "got {err:?}");
        assert!(!err.is_transient());
    }

    /// Pointer for a chat the database has never seen.
    struct DetachedPointer;

    impl ChatPointer for DetachedPointer {
        async fn get_active_chunk_id(&self, _chat_id: &ChatId) -> Result<Option<ChunkId>, RepositoryError> {
            Ok(None)
        }

        async fn set_active_chunk_id(
            &self,
            _chat_id: &ChatId,
            _expected: Option<&ChunkId>,
            _chunk_id: &ChunkId,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    /// Counts chunk writes on their way to SQLite.
    struct CountingStore {
        inner: SqliteChunkStore,
        writes: Arc<AtomicU32>,
    }

    impl ChunkStore for CountingStore {
        async fn get_active(&self, chat_id: &ChatId) -> Result<Option<MessageChunk>, RepositoryError> {
            self.inner.get_active(chat_id).await
        }

        async fn get_by_id(&self, chunk_id: &ChunkId) -> Result<Option<MessageChunk>, RepositoryError> {
            self.inner.get_by_id(chunk_id).await
        }

        async fn save(&self, chunk: &MessageChunk) -> Result<(), RepositoryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.save(chunk).await
        }

        async fn save_linked(
            &self,
            older: &MessageChunk,
            newer: &MessageChunk,
        ) -> Result<(), RepositoryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.save_linked(older, newer).await
        }

        async fn list_for_chat(&self, chat_id: &ChatId) -> Result<Vec<MessageChunk>, RepositoryError> {
            self.inner.list_for_chat(chat_id).await
        }
    }

    #[tokio::test]
    async fn foreign_key_failure_is_attempted_once() {
        let (_dir, store, _chats, _chat_id) = setup().await;
        let writes = Arc::new(AtomicU32::new(0));
        let counting = CountingStore {
            inner: store,
            writes: Arc::clone(&writes),
        };
        let coord = ChatChunkCoordinator::new(counting, DetachedPointer, ChunkingConfig::default());

        let err = coord
            .place_message(&ChatId::new(), &MessageId::new(), MessageKind::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkError::ChunkPersistenceFailure(_)), "got {err:?}");
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writers_in_separate_pools_lose_no_messages() {
        let (dir, store, chats, chat_id) = setup().await;
        let other = second_pool(&dir).await;

        let a = Arc::new(ChatChunkCoordinator::new(store, chats, ChunkingConfig::default()));
        let b = Arc::new(ChatChunkCoordinator::new(
            SqliteChunkStore::new(other.clone()),
            SqliteChatRepository::new(other),
            ChunkingConfig::default(),
        ));

        let seed = MessageId::new();
        a.place_message(&chat_id, &seed, MessageKind::Text).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let coord = if i % 2 == 0 { Arc::clone(&a) } else { Arc::clone(&b) };
            let kind = if i % 3 == 0 { MessageKind::Media } else { MessageKind::Text };
            handles.push(tokio::spawn(async move {
                let id = MessageId::new();
                coord.place_message(&chat_id, &id, kind).await.map(|_| id)
            }));
        }
        let mut placed = HashSet::from([seed]);
        for handle in handles {
            placed.insert(handle.await.unwrap().unwrap());
        }

        let chain = b.chain(&chat_id).await.unwrap();
        let stored: Vec<MessageId> = chain
            .iter()
            .rev()
            .flat_map(|c| c.message_ids.iter().copied())
            .collect();
        assert_eq!(stored.len(), 41, "every placement is stored exactly once");
        assert_eq!(stored.iter().copied().collect::<HashSet<_>>(), placed);
        assert!(chain.len() > 1);
        assert!(a.unreachable_chunks(&chat_id).await.unwrap().is_empty());
    }
}
