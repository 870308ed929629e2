//! SQLite message repository implementation.
//!
//! Implements `MessageRepository` from `campusnet-core`. Every row carries the
//! chunk it was placed into; the chunk's `message_ids` array stays the source
//! of ordering.

use campusnet_core::chat::repository::MessageRepository;
use campusnet_types::chat::{ChatId, ChatMessage, ChunkId, MessageId, MessageKind, UserId};
use campusnet_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `MessageRepository`.
#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct MessageRow {
    id: String,
    chat_id: String,
    sender_id: String,
    kind: String,
    content: String,
    chunk_id: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            kind: row.try_get("kind")?,
            content: row.try_get("content")?,
            chunk_id: row.try_get("chunk_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let kind: MessageKind = self
            .kind
            .parse()
            .map_err(|e| RepositoryError::Query(format!("{e}")))?;

        Ok(ChatMessage {
            id: MessageId::from_uuid(parse_uuid(&self.id, "message id")?),
            chat_id: ChatId::from_uuid(parse_uuid(&self.chat_id, "chat id")?),
            sender_id: UserId::from_uuid(parse_uuid(&self.sender_id, "sender id")?),
            kind,
            content: self.content,
            chunk_id: ChunkId::from_uuid(parse_uuid(&self.chunk_id, "chunk id")?),
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl MessageRepository for SqliteMessageRepository {
    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_messages (id, chat_id, sender_id, kind, content, chunk_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.chat_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(message.kind.to_string())
        .bind(&message.content)
        .bind(message.chunk_id.to_string())
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn get_message(&self, message_id: &MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let message_row =
                    MessageRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(message_row.into_message()?))
            }
            None => Ok(None),
        }
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = ?")
            .bind(message_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_chunk_messages(&self, chunk_id: &ChunkId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE chunk_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(chunk_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                MessageRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_message()
            })
            .collect()
    }
}
