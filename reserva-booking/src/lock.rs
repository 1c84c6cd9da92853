use reserva_core::cache::{AtomicCache, CacheError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another request holds the lock. A domain conflict, not a fault.
    #[error("lock for {key} is held by another request")]
    Held { key: String },

    #[error(transparent)]
    Backend(#[from] CacheError),
}

/// TTL-bounded mutual exclusion on an arbitrary string key, backed by the
/// shared cache. TTL expiry is the recovery mechanism for crashed holders.
pub struct DistributedLock {
    cache: Arc<dyn AtomicCache>,
}

impl DistributedLock {
    pub fn new(cache: Arc<dyn AtomicCache>) -> Self {
        Self { cache }
    }

    fn cache_key(key: &str) -> String {
        format!("lock:{key}")
    }

    /// SET-if-absent with expiry. Succeeds only when no unexpired record
    /// exists for `key`.
    pub async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<(), LockError> {
        let claimed = self
            .cache
            .set_if_absent(&Self::cache_key(key), holder, ttl)
            .await?;
        if claimed {
            return Ok(());
        }
        Err(LockError::Held {
            key: key.to_string(),
        })
    }

    /// Compare-and-delete: removes the lock only while the stored value
    /// still equals `holder`. A lock that expired and was re-acquired by
    /// someone else is left untouched.
    pub async fn release(&self, key: &str, holder: &str) -> Result<(), LockError> {
        self.cache
            .delete_if_equals(&Self::cache_key(key), holder)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserva_core::cache::InMemoryCache;

    fn lock() -> (DistributedLock, Arc<dyn AtomicCache>) {
        let cache: Arc<dyn AtomicCache> = Arc::new(InMemoryCache::new());
        (DistributedLock::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn second_acquire_conflicts() {
        let (lock, _) = lock();
        lock.acquire("room_A:2026-02-15", "req_1", Duration::from_secs(30))
            .await
            .unwrap();

        let err = lock
            .acquire("room_A:2026-02-15", "req_2", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Held { key } if key == "room_A:2026-02-15"));
    }

    #[tokio::test]
    async fn release_then_reacquire() {
        let (lock, _) = lock();
        lock.acquire("room_A:2026-02-15", "req_1", Duration::from_secs(30))
            .await
            .unwrap();
        lock.release("room_A:2026-02-15", "req_1").await.unwrap();
        lock.acquire("room_A:2026-02-15", "req_2", Duration::from_secs(30))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_reacquirable() {
        let (lock, _) = lock();
        lock.acquire("room_A:2026-02-15", "crashed", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        lock.acquire("room_A:2026-02-15", "req_2", Duration::from_secs(30))
            .await
            .unwrap();
    }

    // A delayed release from a holder whose lock already expired must not
    // destroy the lock a newer holder now owns.
    #[tokio::test]
    async fn stale_release_leaves_new_holder_intact() {
        let (lock, _) = lock();
        lock.acquire("room_A:2026-02-15", "old", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        lock.acquire("room_A:2026-02-15", "new", Duration::from_secs(30))
            .await
            .unwrap();

        lock.release("room_A:2026-02-15", "old").await.unwrap();

        let err = lock
            .acquire("room_A:2026-02-15", "third", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));
    }
}
