//! Read Strategies
//!
//! The dashboard and product search each have a baseline and a batched
//! variant, selected once from `batch_read_enabled`. Both variants return
//! the same data; they differ only in how many store round-trips they make
//! and whether the search is paginated.

use std::sync::Arc;

use async_trait::async_trait;
use testbed_core::{Dashboard, ModeConfig, OrderSummary, Product, StorageError, StorageResult, UserId};
use testbed_storage::{DataStore, Page};

// ============================================================================
// DASHBOARD
// ============================================================================

/// Loads a user's dashboard.
#[async_trait]
pub trait DashboardStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unknown users fail with `StorageError::UserNotFound`.
    async fn load(&self, store: &dyn DataStore, user_id: UserId) -> StorageResult<Dashboard>;
}

/// User query, orders query, then one items query per order.
pub struct NaiveDashboard;

#[async_trait]
impl DashboardStrategy for NaiveDashboard {
    fn name(&self) -> &'static str {
        "naive"
    }

    async fn load(&self, store: &dyn DataStore, user_id: UserId) -> StorageResult<Dashboard> {
        let user = store
            .find_user(user_id)
            .await?
            .ok_or(StorageError::UserNotFound { user_id })?;

        let headers = store.orders_for_user(user_id).await?;
        let mut orders = Vec::with_capacity(headers.len());
        for order in headers {
            let items = store.items_for_order(order.id).await?;
            orders.push(OrderSummary { order, items });
        }

        Ok(Dashboard { user, orders })
    }
}

/// User query plus one joined orders-and-items query.
pub struct JoinedDashboard;

#[async_trait]
impl DashboardStrategy for JoinedDashboard {
    fn name(&self) -> &'static str {
        "joined"
    }

    async fn load(&self, store: &dyn DataStore, user_id: UserId) -> StorageResult<Dashboard> {
        let user = store
            .find_user(user_id)
            .await?
            .ok_or(StorageError::UserNotFound { user_id })?;
        let orders = store.order_history(user_id).await?;
        Ok(Dashboard { user, orders })
    }
}

// ============================================================================
// PRODUCT SEARCH
// ============================================================================

/// Searches the catalog by name.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether results are limited to the requested page.
    fn paginates(&self) -> bool;

    async fn search(
        &self,
        store: &dyn DataStore,
        term: &str,
        page: Page,
    ) -> StorageResult<Vec<Product>>;
}

/// Returns every match; the page is ignored.
pub struct FullScanSearch;

#[async_trait]
impl SearchStrategy for FullScanSearch {
    fn name(&self) -> &'static str {
        "full_scan"
    }

    fn paginates(&self) -> bool {
        false
    }

    async fn search(
        &self,
        store: &dyn DataStore,
        term: &str,
        _page: Page,
    ) -> StorageResult<Vec<Product>> {
        store.search_products(term, None).await
    }
}

/// Returns one `LIMIT/OFFSET` page of matches.
pub struct PagedSearch;

#[async_trait]
impl SearchStrategy for PagedSearch {
    fn name(&self) -> &'static str {
        "paged"
    }

    fn paginates(&self) -> bool {
        true
    }

    async fn search(
        &self,
        store: &dyn DataStore,
        term: &str,
        page: Page,
    ) -> StorageResult<Vec<Product>> {
        store.search_products(term, Some(page)).await
    }
}

pub fn dashboard_strategy(config: &ModeConfig) -> Arc<dyn DashboardStrategy> {
    if config.batch_read_enabled {
        Arc::new(JoinedDashboard)
    } else {
        Arc::new(NaiveDashboard)
    }
}

pub fn search_strategy(config: &ModeConfig) -> Arc<dyn SearchStrategy> {
    if config.batch_read_enabled {
        Arc::new(PagedSearch)
    } else {
        Arc::new(FullScanSearch)
    }
}
