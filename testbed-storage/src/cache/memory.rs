//! In-process cache backend over a concurrent hash map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use testbed_core::{CacheError, UserId};
use tokio::time::Instant;

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what the clock can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// TTL cache held in process memory.
///
/// Expiry is lazy: reads remove entries at or past their deadline. Time is
/// taken from `tokio::time::Instant` so tests can drive it with a paused
/// clock.
///
/// Each owner carries a generation counter. A conditional put holds a read
/// guard on the owner's counter while it writes the entry, and invalidation
/// bumps the counter before removing entries, so a put racing an
/// invalidation either lands before the removal or is skipped.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<CacheKey, Entry>,
    generations: DashMap<UserId, u64>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn miss(&self) -> Option<Vec<u8>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return Ok(self.miss()),
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }

        // The shard guard from `get` must be dropped before `remove_if`.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %key, "Cache entry expired");
        }
        Ok(self.miss())
    }

    async fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.clone(), Entry::new(value, ttl));
        Ok(())
    }

    async fn generation(&self, owner: UserId) -> Result<u64, CacheError> {
        Ok(self.generations.get(&owner).map_or(0, |g| *g))
    }

    async fn put_if_generation(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let current = self.generations.get(&key.owner());
        if current.as_deref().copied().unwrap_or(0) != generation {
            tracing::trace!(key = %key, generation, "Skipped put for invalidated owner");
            return Ok(false);
        }
        self.entries.insert(key.clone(), Entry::new(value, ttl));
        drop(current);
        Ok(true)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        if self.entries.remove(key).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn invalidate_owner(&self, owner: UserId) -> Result<u64, CacheError> {
        *self.generations.entry(owner).or_insert(0) += 1;

        let mut removed = 0u64;
        self.entries.retain(|key, _| {
            if key.owner() == owner {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.invalidations.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let memory_bytes = self
            .entries
            .iter()
            .map(|entry| entry.value().value.len() as u64)
            .sum();
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            memory_bytes,
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_then_get_returns_same_bytes() {
        let cache = InMemoryCacheBackend::new();
        let key = CacheKey::recommendations(1);
        cache.put(&key, b"[1,2,3]".to_vec(), TTL).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(&b"[1,2,3]"[..]));
        assert_eq!(cache.get(&CacheKey::dashboard(1)).await.unwrap(), None);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.memory_bytes, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_never_returned_at_or_past_expiry() {
        let cache = InMemoryCacheBackend::new();
        let key = CacheKey::dashboard(5);
        cache.put(&key, b"{}".to_vec(), TTL).await.unwrap();

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert!(cache.get(&key).await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().await.unwrap().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_refreshes_expiry() {
        let cache = InMemoryCacheBackend::new();
        let key = CacheKey::dashboard(5);
        cache.put(&key, b"old".to_vec(), TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.put(&key, b"new".to_vec(), TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[tokio::test]
    async fn test_invalidate_owner_only_touches_that_user() {
        let cache = InMemoryCacheBackend::new();
        for user in [1, 2] {
            cache.put(&CacheKey::recommendations(user), vec![1], TTL).await.unwrap();
            cache.put(&CacheKey::dashboard(user), vec![2], TTL).await.unwrap();
        }

        assert_eq!(cache.invalidate_owner(1).await.unwrap(), 2);
        assert_eq!(cache.invalidate_owner(1).await.unwrap(), 0);
        assert!(cache.get(&CacheKey::recommendations(1)).await.unwrap().is_none());
        assert!(cache.get(&CacheKey::dashboard(2)).await.unwrap().is_some());
        assert_eq!(cache.stats().await.unwrap().invalidations, 2);
    }

    #[tokio::test]
    async fn test_put_if_generation_skips_after_invalidation() {
        let cache = InMemoryCacheBackend::new();
        let key = CacheKey::dashboard(7);
        assert_eq!(cache.generation(7).await.unwrap(), 0);

        let seen = cache.generation(7).await.unwrap();
        cache.invalidate_owner(7).await.unwrap();
        assert_eq!(cache.generation(7).await.unwrap(), 1);

        let stored = cache
            .put_if_generation(&key, b"stale".to_vec(), TTL, seen)
            .await
            .unwrap();
        assert!(!stored);
        assert!(cache.get(&key).await.unwrap().is_none());

        let stored = cache
            .put_if_generation(&key, b"fresh".to_vec(), TTL, 1)
            .await
            .unwrap();
        assert!(stored);
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(&b"fresh"[..]));
    }

    #[tokio::test]
    async fn test_generation_is_per_owner() {
        let cache = InMemoryCacheBackend::new();
        cache.invalidate_owner(1).await.unwrap();

        assert_eq!(cache.generation(1).await.unwrap(), 1);
        assert_eq!(cache.generation(2).await.unwrap(), 0);
        assert!(cache
            .put_if_generation(&CacheKey::recommendations(2), vec![1], TTL, 0)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ttl_beyond_clock_range_never_expires() {
        let cache = InMemoryCacheBackend::new();
        let key = CacheKey::recommendations(9);
        let forever = Duration::from_secs(u64::MAX);

        cache.put(&key, b"[]".to_vec(), forever).await.unwrap();
        assert!(cache
            .put_if_generation(&CacheKey::dashboard(9), b"{}".to_vec(), forever, 0)
            .await
            .unwrap());

        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(&b"[]"[..]));
        assert!(cache.get(&CacheKey::dashboard(9)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let cache = InMemoryCacheBackend::new();
        cache.delete(&CacheKey::dashboard(3)).await.unwrap();
        assert_eq!(cache.stats().await.unwrap().invalidations, 0);
    }
}
