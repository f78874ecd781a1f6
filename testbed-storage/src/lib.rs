//! Testbed Storage - Data Store and Cache Abstractions
//!
//! Defines the `DataStore` trait every endpoint reads and writes through,
//! an in-memory `MockStore` implementing it, and the cache layer consumed by
//! the lookup service. The PostgreSQL implementation lives in testbed-api.

pub mod cache;
pub mod mock;
pub mod seed;
pub mod statements;

pub use cache::{
    CacheBackend, CacheKey, CacheNamespace, CacheStats, InMemoryCacheBackend,
};
pub use mock::MockStore;
pub use seed::{seeded_price, seeded_product, seeded_user, CatalogSeed};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use testbed_core::{
    Cents, Order, OrderId, OrderItem, OrderLine, OrderReceipt, OrderSummary, Product, ProductId,
    StorageResult, User, UserId,
};

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size when the caller asks for a page without a limit.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// One page of a listing (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// Build a page, clamping the number to >= 1 and the limit to `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

// ============================================================================
// DATA STORE TRAIT
// ============================================================================

/// Async data-store contract for the measured shop service.
///
/// The per-row methods exist so the baseline strategies can issue one
/// round-trip per row; `order_history` and `place_order_atomic` are the
/// batched counterparts used by the optimized strategies. Implementations
/// must give identical results through either path.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Cheap reachability check.
    async fn ping(&self) -> StorageResult<()>;

    // ========================================================================
    // CATALOG READS
    // ========================================================================

    /// Products whose name contains `term` (case-insensitive), ordered by id.
    /// `None` returns every match.
    async fn search_products(&self, term: &str, page: Option<Page>)
        -> StorageResult<Vec<Product>>;

    /// Single product lookup.
    async fn find_product(&self, id: ProductId) -> StorageResult<Option<Product>>;

    /// Price of a single product.
    async fn product_price(&self, id: ProductId) -> StorageResult<Option<Cents>>;

    // ========================================================================
    // USER READS
    // ========================================================================

    async fn find_user(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Order headers for a user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> StorageResult<Vec<Order>>;

    /// Items of one order in insertion order.
    async fn items_for_order(&self, order_id: OrderId) -> StorageResult<Vec<OrderItem>>;

    /// Orders with their items in one round-trip, newest order first.
    async fn order_history(&self, user_id: UserId) -> StorageResult<Vec<OrderSummary>>;

    /// Products the user has not bought yet from categories they bought from,
    /// most expensive first (ties by id). When that yields nothing the first
    /// `limit` products by id are returned. Unknown users are an error.
    async fn recommendations(&self, user_id: UserId, limit: usize)
        -> StorageResult<Vec<Product>>;

    // ========================================================================
    // PER-ROW WRITES
    // ========================================================================

    async fn insert_order(&self, user_id: UserId, total_cents: Cents) -> StorageResult<Order>;

    async fn insert_order_item(&self, item: &OrderItem) -> StorageResult<()>;

    async fn update_order_total(&self, order_id: OrderId, total_cents: Cents)
        -> StorageResult<()>;

    // ========================================================================
    // TRANSACTIONAL BATCH WRITE
    // ========================================================================

    /// Write an order and all its lines as one all-or-nothing unit.
    ///
    /// Inside one transaction: verify the user, read every referenced
    /// product in a single batched read, price the order from that read,
    /// insert the header and then all items in one multi-row statement.
    /// A missing product or user fails before anything is written; any
    /// failure or cancellation leaves nothing persisted.
    async fn place_order_atomic(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
    ) -> StorageResult<OrderReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        let page = Page::default();
        assert_eq!(page, Page { page: 1, limit: DEFAULT_PAGE_LIMIT });
        assert_eq!(page.offset(), 0);

        let page = Page::new(Some(0), Some(10_000));
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, MAX_PAGE_LIMIT);

        let page = Page::new(Some(3), Some(20));
        assert_eq!(page.offset(), 40);
    }

    proptest! {
        #[test]
        fn prop_page_is_always_in_bounds(page in any::<Option<u32>>(), limit in any::<Option<u32>>()) {
            let p = Page::new(page, limit);
            prop_assert!(p.page >= 1);
            prop_assert!((1..=MAX_PAGE_LIMIT).contains(&p.limit));
            prop_assert_eq!(p.offset(), u64::from(p.page - 1) * u64::from(p.limit));
        }
    }
}
