//! Per-chat write serialization for chunk placement.
//!
//! One async mutex per chat, created lazily in a `DashMap`. The map guard is
//! released before awaiting the mutex, so no `DashMap` shard lock is ever
//! held across `.await`. An entry is removed again when its last guard drops
//! and nobody is waiting on it, so the table only holds chats with work in
//! flight.
//!
//! This only orders writers inside one process. Writers in other processes
//! are caught by the version checks in the chunk store.

use std::sync::Arc;

use campusnet_types::chat::ChatId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<ChatId, Arc<Mutex<()>>>;

/// Lazily-populated table of per-chat mutexes.
///
/// Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct ChatLocks {
    inner: Arc<LockTable>,
}

/// Exclusive access to one chat. Releases the lock on drop.
#[derive(Debug)]
pub struct ChatLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    chat_id: ChatId,
    table: Arc<LockTable>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chat_id`.
    pub async fn acquire(&self, chat_id: ChatId) -> ChatLockGuard {
        let lock = Arc::clone(
            self.inner
                .entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        ChatLockGuard {
            guard: Some(lock.lock_owned().await),
            chat_id,
            table: Arc::clone(&self.inner),
        }
    }

    /// Number of chats currently locked or waited on.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Drop for ChatLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table's own reference is the only one left when no holder or
        // waiter remains. `remove_if` checks under the shard lock, which
        // `acquire` also takes to clone the mutex.
        self.table
            .remove_if(&self.chat_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_chat_is_exclusive() {
        let locks = ChatLocks::new();
        let chat = ChatId::new();

        let guard = locks.acquire(chat).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(chat)).await;
        assert!(second.is_err(), "second acquire should block while first is held");

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.acquire(chat)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn different_chats_do_not_block() {
        let locks = ChatLocks::new();
        let _a = locks.acquire(ChatId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(ChatId::new())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn clones_share_the_table() {
        let locks = ChatLocks::new();
        let other = locks.clone();
        let chat = ChatId::new();
        let _guard = locks.acquire(chat).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), other.acquire(chat)).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn released_chats_leave_the_table() {
        let locks = ChatLocks::new();
        let a = locks.acquire(ChatId::new()).await;
        let b = locks.acquire(ChatId::new()).await;
        assert_eq!(locks.len(), 2);

        drop(a);
        assert_eq!(locks.len(), 1);
        drop(b);
        assert_eq!(locks.len(), 0);

        for _ in 0..100 {
            drop(locks.acquire(ChatId::new()).await);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = ChatLocks::new();
        let chat = ChatId::new();
        let first = locks.acquire(chat).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(chat).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1, "waiter still holds a reference");

        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
