//! Application state wiring all services together.
//!
//! `MessageAppendService` is generic over its ports; AppState pins it to the
//! SQLite implementations from campusnet-infra.

use std::path::Path;
use std::sync::Arc;

use campusnet_core::chat::service::MessageAppendService;
use campusnet_core::chunk::coordinator::ChatChunkCoordinator;
use campusnet_infra::sqlite::chat::SqliteChatRepository;
use campusnet_infra::sqlite::chunk::SqliteChunkStore;
use campusnet_infra::sqlite::message::SqliteMessageRepository;
use campusnet_infra::sqlite::pool::{DatabasePool, database_url};
use campusnet_types::config::GlobalConfig;

/// The append service pinned to its SQLite ports.
pub type ConcreteAppendService = MessageAppendService<
    SqliteChatRepository,
    SqliteMessageRepository,
    SqliteChunkStore,
    SqliteChatRepository,
>;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub append_service: Arc<ConcreteAppendService>,
    /// User, chat, and membership registration.
    pub chats: SqliteChatRepository,
}

impl AppState {
    /// Connect to the database in `data_dir` and wire the services.
    pub async fn init(data_dir: &Path, config: &GlobalConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&database_url(data_dir)).await?;

        let chats = SqliteChatRepository::new(db_pool.clone());
        let coordinator = ChatChunkCoordinator::new(
            SqliteChunkStore::new(db_pool.clone()),
            chats.clone(),
            config.chunking.clone(),
        );
        let append_service = MessageAppendService::new(
            chats.clone(),
            SqliteMessageRepository::new(db_pool),
            coordinator,
        );

        tracing::debug!(data_dir = %data_dir.display(), "Application state initialized");

        Ok(Self {
            append_service: Arc::new(append_service),
            chats,
        })
    }
}
