//! Cache backend trait and usage statistics.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use testbed_core::{CacheError, UserId};

use super::key::CacheKey;

/// Pluggable cache backend.
///
/// Backends store opaque bytes; encoding is the caller's concern. Every
/// operation is fallible so that a remote backend can report outages, and
/// callers are expected to degrade rather than fail the request.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Stored bytes for `key`, or `None` if absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous entry.
    async fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Current invalidation generation of `owner`. Starts at 0 and advances
    /// on every `invalidate_owner`.
    async fn generation(&self, owner: UserId) -> Result<u64, CacheError>;

    /// Store `value` only while the key's owner is still at `generation`.
    ///
    /// Returns `false` without storing when the owner was invalidated since
    /// `generation` was read. The check and the write are atomic with respect
    /// to `invalidate_owner`.
    async fn put_if_generation(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError>;

    /// Remove one entry. Removing an absent key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Advance the owner's generation and remove every entry it owns,
    /// returning how many were removed.
    async fn invalidate_owner(&self, owner: UserId) -> Result<u64, CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Backend-side counters. Hit/miss accounting for reporting lives in the
/// event recorder; these are diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently stored, including expired ones not yet read.
    pub entry_count: u64,
    /// Approximate bytes held by stored values.
    pub memory_bytes: u64,
    /// Entries removed because they were found expired.
    pub expirations: u64,
    /// Entries removed by delete or owner invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
