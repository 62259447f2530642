//! Per-queue mutual exclusion
//!
//! Serialises the fetch-mutate-write sequence on a single (guild, queue)
//! inside this process. The store still decides between writers from other
//! processes.

use crate::error::{PickupError, Result};
use crate::types::GuildId;
use crate::utils::queue_key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockKey = (GuildId, String);

/// Held while a queue is being mutated
pub type QueueGuard = OwnedMutexGuard<()>;

/// Registry of one async mutex per queue key
#[derive(Debug, Default)]
pub struct QueueLocks {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl QueueLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a queue
    pub async fn lock(&self, guild_id: GuildId, name: &str) -> Result<QueueGuard> {
        let lock = self.entry(guild_id, name)?;
        Ok(lock.lock_owned().await)
    }

    /// Lock two queues in a fixed order so concurrent renames cannot deadlock
    pub async fn lock_pair(
        &self,
        guild_id: GuildId,
        first: &str,
        second: &str,
    ) -> Result<(QueueGuard, Option<QueueGuard>)> {
        let (a, b) = (queue_key(first), queue_key(second));
        if a == b {
            return Ok((self.lock(guild_id, &a).await?, None));
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let low_guard = self.lock(guild_id, &low).await?;
        let high_guard = self.lock(guild_id, &high).await?;
        Ok((low_guard, Some(high_guard)))
    }

    /// Number of queue keys currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn entry(&self, guild_id: GuildId, name: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| PickupError::InternalError {
            message: "Failed to acquire queue lock registry".to_string(),
        })?;

        // Drop entries nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        let lock = locks
            .entry((guild_id, queue_key(name)))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_queue_is_serialised() {
        let locks = Arc::new(QueueLocks::new());
        let guard = locks.lock(1, "CTF").await.unwrap();

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.lock(1, "ctf").await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_different_queues_do_not_block() {
        let locks = QueueLocks::new();
        let _ctf = locks.lock(1, "ctf").await.unwrap();
        let _tdm = locks.lock(1, "tdm").await.unwrap();
        let _other_guild = locks.lock(2, "ctf").await.unwrap();
        assert_eq!(locks.tracked(), 3);
    }

    #[tokio::test]
    async fn test_lock_pair_same_key_locks_once() {
        let locks = QueueLocks::new();
        let (_guard, second) = locks.lock_pair(1, "CTF", "ctf").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = QueueLocks::new();
        {
            let _guard = locks.lock(1, "ctf").await.unwrap();
        }
        let _guard = locks.lock(1, "tdm").await.unwrap();
        assert_eq!(locks.tracked(), 1);
    }
}
