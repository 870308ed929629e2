//! SQLite chat repository implementation.
//!
//! Owns the `users`, `chats`, and `chat_members` tables. Implements
//! `ChatDirectory` and `ChatPointer` from `campusnet-core`, plus the
//! registration operations the CLI uses to set up users and chats.

use campusnet_core::chat::repository::ChatDirectory;
use campusnet_core::chunk::store::ChatPointer;
use campusnet_types::chat::{Chat, ChatId, ChunkId, User, UserId};
use campusnet_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed users, chats, and membership.
#[derive(Clone)]
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct UserRow {
    id: String,
    display_name: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        Ok(User {
            id: UserId::from_uuid(parse_uuid(&self.id, "user id")?),
            display_name: self.display_name,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct ChatRow {
    id: String,
    name: String,
    active_chunk_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            active_chunk_id: row.try_get("active_chunk_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, RepositoryError> {
        Ok(Chat {
            id: ChatId::from_uuid(parse_uuid(&self.id, "chat id")?),
            name: self.name,
            active_chunk_id: self
                .active_chunk_id
                .as_deref()
                .map(|s| parse_uuid(s, "chunk id").map(ChunkId::from_uuid))
                .transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Map constraint failures on membership inserts.
fn membership_error(e: sqlx::Error) -> RepositoryError {
    match query_error(e) {
        RepositoryError::Conflict(_) => {
            RepositoryError::Conflict("user is already a member".to_string())
        }
        RepositoryError::Constraint(_) => RepositoryError::NotFound,
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

impl SqliteChatRepository {
    pub async fn create_user(&self, user: &User) -> Result<User, RepositoryError> {
        sqlx::query("INSERT INTO users (id, display_name, created_at) VALUES (?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.display_name)
            .bind(format_datetime(&user.created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(user.clone())
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let user_row =
                    UserRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(user_row.into_user()?))
            }
            None => Ok(None),
        }
    }

    /// Create a chat and its initial members in one transaction.
    pub async fn create_chat(&self, chat: &Chat, members: &[UserId]) -> Result<Chat, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            "INSERT INTO chats (id, name, active_chunk_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chat.id.to_string())
        .bind(&chat.name)
        .bind(chat.active_chunk_id.map(|id| id.to_string()))
        .bind(format_datetime(&chat.created_at))
        .bind(format_datetime(&chat.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let joined_at = format_datetime(&chat.created_at);
        for user_id in members {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat.id.to_string())
                .bind(user_id.to_string())
                .bind(&joined_at)
                .execute(&mut *tx)
                .await
                .map_err(membership_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(chat.clone())
    }

    pub async fn get_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let chat_row =
                    ChatRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(chat_row.into_chat()?))
            }
            None => Ok(None),
        }
    }

    /// Add a user to a chat.
    ///
    /// `NotFound` if either side does not exist, `Conflict` if already a member.
    pub async fn add_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(chat_id.to_string())
            .bind(user_id.to_string())
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(membership_error)?;
        Ok(())
    }

    /// Members of a chat in join order.
    pub async fn list_members(&self, chat_id: &ChatId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT u.* FROM users u
             JOIN chat_members m ON m.user_id = u.id
             WHERE m.chat_id = ?
             ORDER BY m.joined_at ASC, u.id ASC",
        )
        .bind(chat_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                UserRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_user()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

impl ChatDirectory for SqliteChatRepository {
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }

    async fn chat_exists(&self, chat_id: &ChatId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }

    async fn is_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }
}

impl ChatPointer for SqliteChatRepository {
    async fn get_active_chunk_id(&self, chat_id: &ChatId) -> Result<Option<ChunkId>, RepositoryError> {
        let row = sqlx::query("SELECT active_chunk_id FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?
            .ok_or(RepositoryError::NotFound)?;

        let active: Option<String> = row
            .try_get("active_chunk_id")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        active
            .as_deref()
            .map(|s| parse_uuid(s, "chunk id").map(ChunkId::from_uuid))
            .transpose()
    }

    async fn set_active_chunk_id(
        &self,
        chat_id: &ChatId,
        expected: Option<&ChunkId>,
        chunk_id: &ChunkId,
    ) -> Result<(), RepositoryError> {
        let target = chunk_id.to_string();
        let result = sqlx::query(
            "UPDATE chats SET active_chunk_id = ?, updated_at = ?
             WHERE id = ? AND (active_chunk_id IS ? OR active_chunk_id = ?)",
        )
        .bind(target.clone())
        .bind(format_datetime(&Utc::now()))
        .bind(chat_id.to_string())
        .bind(expected.map(|id| id.to_string()))
        .bind(target.clone())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        match exists {
            Some(_) => Err(RepositoryError::Conflict(format!(
                "active chunk of chat {chat_id} has moved"
            ))),
            None => Err(RepositoryError::NotFound),
        }
    }
}
