//! Cache-Backed Lookup Service
//!
//! Serves recommendations and dashboards as serialized JSON bytes. With the
//! cache enabled, a hit returns the stored bytes untouched and a miss
//! computes, stores and returns them. With the cache disabled every call
//! computes and the cache is never consulted.
//!
//! The cache is an accelerator only: backend failures degrade to a miss on
//! read and are logged on write, never surfacing to the caller.
//!
//! A miss reads the owner's cache generation before computing and stores the
//! result only if that generation still holds, so a read that overlaps an
//! invalidation for the same user never repopulates the cache with data
//! taken before the write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use testbed_core::{ModeConfig, UserId};
use testbed_storage::{CacheBackend, CacheKey, DataStore};

use super::reads::DashboardStrategy;
use crate::error::ApiResult;
use crate::telemetry::Telemetry;

/// Number of products returned by a recommendations lookup.
pub const RECOMMENDATION_LIMIT: usize = 10;

/// How lookups reach their data.
#[derive(Clone)]
pub enum ReadPath {
    /// Always query the store.
    Direct,
    /// Consult the cache first; store misses for `ttl`.
    Cached {
        backend: Arc<dyn CacheBackend>,
        ttl: Duration,
    },
}

impl ReadPath {
    /// Pick the read path once from the mode configuration.
    pub fn for_config(config: &ModeConfig, backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        if config.cache_enabled {
            ReadPath::Cached { backend, ttl }
        } else {
            ReadPath::Direct
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, ReadPath::Cached { .. })
    }
}

impl std::fmt::Debug for ReadPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadPath::Direct => f.write_str("Direct"),
            ReadPath::Cached { backend, ttl } => f
                .debug_struct("Cached")
                .field("backend", &backend.name())
                .field("ttl", ttl)
                .finish(),
        }
    }
}

/// Lookup service shared by the recommendation and dashboard routes.
pub struct LookupService {
    store: Arc<dyn DataStore>,
    read_path: ReadPath,
    dashboard: Arc<dyn DashboardStrategy>,
    telemetry: Telemetry,
}

impl LookupService {
    pub fn new(
        store: Arc<dyn DataStore>,
        read_path: ReadPath,
        dashboard: Arc<dyn DashboardStrategy>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            read_path,
            dashboard,
            telemetry,
        }
    }

    pub fn read_path(&self) -> &ReadPath {
        &self.read_path
    }

    /// Recommended products for a user as JSON.
    pub async fn recommendations(&self, user_id: UserId) -> ApiResult<Vec<u8>> {
        self.lookup(CacheKey::recommendations(user_id), || async move {
            let products = self
                .store
                .recommendations(user_id, RECOMMENDATION_LIMIT)
                .await?;
            Ok(serde_json::to_vec(&products)?)
        })
        .await
    }

    /// A user's dashboard as JSON.
    pub async fn dashboard(&self, user_id: UserId) -> ApiResult<Vec<u8>> {
        self.lookup(CacheKey::dashboard(user_id), || async move {
            let dashboard = self.dashboard.load(self.store.as_ref(), user_id).await?;
            Ok(serde_json::to_vec(&dashboard)?)
        })
        .await
    }

    /// Drop every cached read keyed to `user_id`. No-op without a cache.
    pub async fn invalidate_user(&self, user_id: UserId) {
        let ReadPath::Cached { backend, .. } = &self.read_path else {
            return;
        };
        match backend.invalidate_owner(user_id).await {
            Ok(removed) => tracing::debug!(user_id, removed, "Invalidated cached reads"),
            Err(e) => tracing::warn!(user_id, error = %e, "Cache invalidation failed"),
        }
    }

    async fn lookup<F, Fut>(&self, key: CacheKey, compute: F) -> ApiResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<Vec<u8>>>,
    {
        let (backend, ttl) = match &self.read_path {
            ReadPath::Direct => return compute().await,
            ReadPath::Cached { backend, ttl } => (backend, *ttl),
        };

        match backend.get(&key).await {
            Ok(Some(bytes)) => {
                self.telemetry.cache_hit();
                tracing::debug!(%key, "Cache hit");
                return Ok(bytes);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "Cache read failed, treating as miss"),
        }

        self.telemetry.cache_miss();
        tracing::debug!(%key, "Cache miss");

        let generation = match backend.generation(key.owner()).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cache generation read failed, skipping write");
                None
            }
        };

        let bytes = compute().await?;
        let Some(generation) = generation else {
            return Ok(bytes);
        };
        match backend.put_if_generation(&key, bytes.clone(), ttl, generation).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(%key, generation, "Owner invalidated during lookup, not cached"),
            Err(e) => tracing::warn!(%key, error = %e, "Cache write failed"),
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::reads::JoinedDashboard;
    use testbed_core::{Dashboard, EventRecorder, Mode};
    use testbed_storage::{CatalogSeed, InMemoryCacheBackend, MockStore};
    use testbed_test_utils::fixtures::lines;
    use testbed_test_utils::SlowPutCacheBackend;

    struct Fixture {
        store: Arc<MockStore>,
        cache: Arc<InMemoryCacheBackend>,
        recorder: Arc<EventRecorder>,
        service: LookupService,
    }

    fn fixture(mode: Mode) -> Fixture {
        let store = Arc::new(MockStore::new());
        store
            .seed(CatalogSeed {
                users: 5,
                products: 40,
            })
            .unwrap();
        let cache = Arc::new(InMemoryCacheBackend::new());
        let recorder = Arc::new(EventRecorder::new());
        let telemetry = Telemetry::new(recorder.clone()).unwrap();
        let read_path = ReadPath::for_config(
            &ModeConfig::for_mode(mode),
            cache.clone(),
            Duration::from_secs(60),
        );
        let service = LookupService::new(store.clone(), read_path, Arc::new(JoinedDashboard), telemetry);
        Fixture {
            store,
            cache,
            recorder,
            service,
        }
    }

    #[tokio::test]
    async fn test_cached_hit_returns_identical_bytes() {
        let f = fixture(Mode::Optimized);

        let first = f.service.recommendations(1).await.unwrap();
        f.store.reset_round_trips();
        let second = f.service.recommendations(1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.round_trips(), 0);
        assert_eq!(f.recorder.cache_counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_direct_path_never_touches_cache() {
        let f = fixture(Mode::Baseline);

        let first = f.service.dashboard(2).await.unwrap();
        let second = f.service.dashboard(2).await.unwrap();

        assert_eq!(first, second);
        assert!(f.cache.is_empty());
        assert_eq!(f.recorder.cache_counts(), (0, 0));
    }

    #[tokio::test]
    async fn test_invalidate_user_forces_miss() {
        let f = fixture(Mode::Optimized);

        f.service.dashboard(3).await.unwrap();
        f.service.recommendations(3).await.unwrap();
        f.service.recommendations(4).await.unwrap();
        f.service.invalidate_user(3).await;

        f.service.dashboard(3).await.unwrap();
        f.service.recommendations(4).await.unwrap();
        assert_eq!(f.recorder.cache_counts(), (1, 4));
    }

    #[tokio::test]
    async fn test_store_errors_propagate_and_are_not_cached() {
        let f = fixture(Mode::Optimized);

        let err = f.service.recommendations(999).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);
        assert!(f.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_slow_write_is_not_overwritten() {
        let store = Arc::new(MockStore::new().with_latency(Duration::from_millis(20)));
        store
            .seed(CatalogSeed {
                users: 5,
                products: 40,
            })
            .unwrap();
        let cache = Arc::new(SlowPutCacheBackend::new(Duration::from_millis(150)));
        let recorder = Arc::new(EventRecorder::new());
        let read_path = ReadPath::for_config(
            &ModeConfig::for_mode(Mode::Optimized),
            cache,
            Duration::from_secs(60),
        );
        let service = Arc::new(LookupService::new(
            store.clone(),
            read_path,
            Arc::new(JoinedDashboard),
            Telemetry::new(recorder).unwrap(),
        ));

        let in_flight = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.dashboard(1).await }
        });

        // The read has its data and is parked in the slow cache write.
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.place_order_atomic(1, &lines(&[1, 2])).await.unwrap();
        service.invalidate_user(1).await;

        let stale: Dashboard = serde_json::from_slice(&in_flight.await.unwrap().unwrap()).unwrap();
        let fresh: Dashboard = serde_json::from_slice(&service.dashboard(1).await.unwrap()).unwrap();
        assert_eq!(stale.orders.len(), 0);
        assert_eq!(fresh.orders.len(), 1);
    }

    #[test]
    fn test_read_path_selection() {
        let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::new());
        let ttl = Duration::from_secs(1);

        let mut config = ModeConfig::for_mode(Mode::Optimized);
        assert!(ReadPath::for_config(&config, backend.clone(), ttl).is_cached());
        config.cache_enabled = false;
        assert!(!ReadPath::for_config(&config, backend, ttl).is_cached());
    }
}
