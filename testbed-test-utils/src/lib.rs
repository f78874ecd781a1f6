//! Testbed Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for samples and checkout lines
//! - Seeded store fixtures
//! - A cache backend that always fails, for degradation tests
//! - A cache backend with slow writes, for invalidation races

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

pub use testbed_core::{
    CacheError, EventRecorder, Mode, ModeConfig, OrderLine, QuerySample, RequestSample,
    StatsSnapshot, StorageError,
};
pub use testbed_storage::{
    CacheBackend, CacheKey, CacheStats, CatalogSeed, InMemoryCacheBackend, MockStore,
};

use testbed_core::UserId;

// ============================================================================
// FAILING CACHE
// ============================================================================

/// Cache backend whose every operation reports the backend as unavailable.
#[derive(Debug, Default)]
pub struct FailingCacheBackend {
    calls: AtomicU64,
}

impl FailingCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against the backend.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable {
            reason: "cache offline".to_string(),
        })
    }
}

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        self.fail()
    }

    async fn put(&self, _key: &CacheKey, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }

    async fn generation(&self, _owner: UserId) -> Result<u64, CacheError> {
        self.fail()
    }

    async fn put_if_generation(
        &self,
        _key: &CacheKey,
        _value: Vec<u8>,
        _ttl: Duration,
        _generation: u64,
    ) -> Result<bool, CacheError> {
        self.fail()
    }

    async fn delete(&self, _key: &CacheKey) -> Result<(), CacheError> {
        self.fail()
    }

    async fn invalidate_owner(&self, _owner: UserId) -> Result<u64, CacheError> {
        self.fail()
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.fail()
    }
}

// ============================================================================
// SLOW-WRITE CACHE
// ============================================================================

/// In-memory cache whose writes sleep before landing.
///
/// Widens the window between a lookup's data read and its cache write so
/// that an invalidation can be scheduled inside it.
#[derive(Debug)]
pub struct SlowPutCacheBackend {
    inner: InMemoryCacheBackend,
    delay: Duration,
}

impl SlowPutCacheBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryCacheBackend::new(),
            delay,
        }
    }
}

#[async_trait]
impl CacheBackend for SlowPutCacheBackend {
    fn name(&self) -> &'static str {
        "slow-put"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, value, ttl).await
    }

    async fn generation(&self, owner: UserId) -> Result<u64, CacheError> {
        self.inner.generation(owner).await
    }

    async fn put_if_generation(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_if_generation(key, value, ttl, generation).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn invalidate_owner(&self, owner: UserId) -> Result<u64, CacheError> {
        self.inner.invalidate_owner(owner).await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.inner.stats().await
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for testbed types.

    use super::*;
    use proptest::prelude::*;

    /// Plausible request latency in milliseconds.
    pub fn arb_duration_ms() -> impl Strategy<Value = f64> {
        0.0f64..5_000.0
    }

    pub fn arb_durations(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(arb_duration_ms(), 1..=max_len)
    }

    pub fn arb_status_code() -> impl Strategy<Value = u16> {
        prop_oneof![
            4 => Just(200u16),
            1 => Just(201u16),
            1 => Just(400u16),
            1 => Just(404u16),
            1 => Just(500u16),
            1 => Just(504u16),
        ]
    }

    pub fn arb_request_sample() -> impl Strategy<Value = RequestSample> {
        (
            prop_oneof![Just("GET"), Just("POST")],
            prop_oneof![
                Just("/products"),
                Just("/users/1/dashboard"),
                Just("/recommendations/1"),
                Just("/checkout"),
            ],
            arb_duration_ms(),
            arb_status_code(),
            0i64..1_000_000,
        )
            .prop_map(|(method, path, duration_ms, status, ts)| {
                RequestSample::new(method, path, duration_ms, status).at(ts)
            })
    }

    /// Arbitrary query text, including multi-byte characters and long runs.
    pub fn arb_query_text() -> impl Strategy<Value = String> {
        "[a-zA-Zé日 ,()*=$0-9\\n\\t]{0,300}"
    }

    /// Checkout line referencing one of `products` seeded products.
    pub fn arb_order_line(products: i64) -> impl Strategy<Value = OrderLine> {
        (1..=products, 1i32..=100).prop_map(|(product_id, quantity)| OrderLine {
            product_id,
            quantity,
        })
    }

    pub fn arb_order_lines(products: i64, max_items: usize) -> impl Strategy<Value = Vec<OrderLine>> {
        prop::collection::vec(arb_order_line(products), 1..=max_items)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores and requests for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// Catalog small enough for fast tests.
    pub const SMALL_CATALOG: CatalogSeed = CatalogSeed {
        users: 20,
        products: 200,
    };

    /// MockStore seeded with [`SMALL_CATALOG`].
    pub fn seeded_store() -> MockStore {
        let store = MockStore::new();
        store
            .seed(SMALL_CATALOG)
            .expect("seeding an empty store cannot fail");
        store
    }

    /// Seeded store that reports its round-trips to `recorder`.
    pub fn recording_store(recorder: Arc<EventRecorder>) -> MockStore {
        let store = MockStore::new().with_recorder(recorder);
        store
            .seed(SMALL_CATALOG)
            .expect("seeding an empty store cannot fail");
        store
    }

    /// Lines with quantity 1 for each product id.
    pub fn lines(product_ids: &[i64]) -> Vec<OrderLine> {
        product_ids
            .iter()
            .map(|&product_id| OrderLine {
                product_id,
                quantity: 1,
            })
            .collect()
    }

    /// Request samples with the given durations, one second apart.
    pub fn samples_with_durations(durations: &[f64]) -> Vec<RequestSample> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| RequestSample::new("GET", "/products", d, 200).at(i as i64 * 1_000))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_cache_counts_calls() {
        let cache = FailingCacheBackend::new();
        let key = CacheKey::recommendations(1);

        assert!(cache.get(&key).await.is_err());
        assert!(cache.put(&key, vec![1], Duration::from_secs(1)).await.is_err());
        assert!(cache.invalidate_owner(1).await.is_err());
        assert!(cache.generation(1).await.is_err());
        assert_eq!(cache.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_put_delays_only_writes() {
        let cache = SlowPutCacheBackend::new(Duration::from_millis(100));
        let key = CacheKey::dashboard(1);
        let started = tokio::time::Instant::now();

        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(started.elapsed(), Duration::ZERO);

        cache.put(&key, vec![1], Duration::from_secs(60)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(cache.get(&key).await.unwrap().is_some());
    }

    #[test]
    fn test_seeded_store_has_catalog() {
        let store = fixtures::seeded_store();
        assert_eq!(store.order_count(), 0);
    }
}
