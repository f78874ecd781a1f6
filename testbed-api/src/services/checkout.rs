//! Transactional Write Service
//!
//! A checkout writes one order header and its line items. Two strategies
//! exist:
//! - `BatchedCheckout` hands the whole order to the store's atomic write;
//!   nothing is visible unless everything succeeded.
//! - `NaiveCheckout` issues one statement per step with no transaction, so
//!   a failure partway leaves the rows written before it in place.
//!
//! After a checkout the user's cached reads are invalidated.

use std::sync::Arc;

use async_trait::async_trait;
use testbed_core::{
    Cents, ModeConfig, OrderItem, OrderLine, OrderReceipt, StorageError, StorageResult, UserId,
};
use testbed_storage::DataStore;

use super::lookup::LookupService;
use crate::error::ApiResult;
use crate::telemetry::Telemetry;
use crate::validation::CheckoutRequest;

/// Writes a validated order to the store.
#[async_trait]
pub trait CheckoutStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a failed write is guaranteed to leave nothing behind.
    fn is_atomic(&self) -> bool;

    async fn place(
        &self,
        store: &dyn DataStore,
        user_id: UserId,
        lines: &[OrderLine],
    ) -> StorageResult<OrderReceipt>;
}

/// Per-row writes without a transaction.
pub struct NaiveCheckout;

#[async_trait]
impl CheckoutStrategy for NaiveCheckout {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn is_atomic(&self) -> bool {
        false
    }

    async fn place(
        &self,
        store: &dyn DataStore,
        user_id: UserId,
        lines: &[OrderLine],
    ) -> StorageResult<OrderReceipt> {
        if store.find_user(user_id).await?.is_none() {
            return Err(StorageError::UserNotFound { user_id });
        }

        let order = store.insert_order(user_id, 0).await?;
        let mut total_cents: Cents = 0;

        for line in lines {
            let product = store
                .find_product(line.product_id)
                .await?
                .ok_or_else(|| StorageError::MissingProducts {
                    ids: vec![line.product_id],
                })?;

            // Second read of the same row, kept as part of the baseline cost.
            let unit_price_cents = store
                .product_price(product.id)
                .await?
                .unwrap_or(product.price_cents);

            store
                .insert_order_item(&OrderItem {
                    order_id: order.id,
                    product_id: product.id,
                    quantity: line.quantity,
                    unit_price_cents,
                })
                .await?;

            total_cents += unit_price_cents * Cents::from(line.quantity);
        }

        store.update_order_total(order.id, total_cents).await?;

        Ok(OrderReceipt {
            order_id: order.id,
            user_id,
            total_cents,
            item_count: lines.len(),
        })
    }
}

/// Single transaction with batched reads and a multi-row insert.
pub struct BatchedCheckout;

#[async_trait]
impl CheckoutStrategy for BatchedCheckout {
    fn name(&self) -> &'static str {
        "batched"
    }

    fn is_atomic(&self) -> bool {
        true
    }

    async fn place(
        &self,
        store: &dyn DataStore,
        user_id: UserId,
        lines: &[OrderLine],
    ) -> StorageResult<OrderReceipt> {
        store.place_order_atomic(user_id, lines).await
    }
}

pub fn checkout_strategy(config: &ModeConfig) -> Arc<dyn CheckoutStrategy> {
    if config.batch_write_enabled {
        Arc::new(BatchedCheckout)
    } else {
        Arc::new(NaiveCheckout)
    }
}

/// Validates checkout requests, runs the configured strategy and keeps the
/// lookup cache consistent with the write.
pub struct CheckoutService {
    store: Arc<dyn DataStore>,
    strategy: Arc<dyn CheckoutStrategy>,
    lookup: Arc<LookupService>,
    telemetry: Telemetry,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn DataStore>,
        strategy: Arc<dyn CheckoutStrategy>,
        lookup: Arc<LookupService>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            strategy,
            lookup,
            telemetry,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub async fn checkout(&self, request: &CheckoutRequest) -> ApiResult<OrderReceipt> {
        let (user_id, lines) = request.validate()?;

        let result = self
            .strategy
            .place(self.store.as_ref(), user_id, &lines)
            .await;
        self.telemetry
            .metrics
            .record_checkout(self.strategy.name(), result.is_ok());

        match result {
            Ok(receipt) => {
                self.lookup.invalidate_user(user_id).await;
                tracing::info!(
                    order_id = receipt.order_id,
                    user_id,
                    total_cents = receipt.total_cents,
                    items = receipt.item_count,
                    strategy = self.strategy.name(),
                    "Order placed"
                );
                Ok(receipt)
            }
            Err(e) => {
                // Rows written before the failure are still there.
                if !self.strategy.is_atomic() {
                    self.lookup.invalidate_user(user_id).await;
                }
                tracing::warn!(
                    user_id,
                    error = %e,
                    strategy = self.strategy.name(),
                    "Checkout failed"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_core::Mode;
    use testbed_storage::{CatalogSeed, MockStore};

    fn seeded() -> MockStore {
        let store = MockStore::new();
        store
            .seed(CatalogSeed {
                users: 3,
                products: 10,
            })
            .unwrap();
        store
    }

    fn lines(ids: &[i64]) -> Vec<OrderLine> {
        ids.iter()
            .map(|&product_id| OrderLine {
                product_id,
                quantity: 2,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_strategies_persist_the_same_state() {
        let naive_store = seeded();
        let batched_store = seeded();
        let order = lines(&[1, 4, 7]);

        let naive = NaiveCheckout.place(&naive_store, 2, &order).await.unwrap();
        let batched = BatchedCheckout.place(&batched_store, 2, &order).await.unwrap();

        assert_eq!(naive, batched);
        assert_eq!(naive_store.items().unwrap(), batched_store.items().unwrap());

        let naive_orders = naive_store.orders().unwrap();
        let batched_orders = batched_store.orders().unwrap();
        assert_eq!(naive_orders.len(), 1);
        assert_eq!(naive_orders[0].total_cents, batched_orders[0].total_cents);
    }

    #[tokio::test]
    async fn test_naive_keeps_rows_written_before_a_missing_product() {
        let store = seeded();

        let err = NaiveCheckout
            .place(&store, 1, &lines(&[1, 2, 999, 3, 4]))
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::MissingProducts { ids: vec![999] });
        let items = store.items().unwrap();
        let persisted: Vec<i64> = items.iter().map(|i| i.product_id).collect();
        assert_eq!(persisted, vec![1, 2]);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_batched_missing_product_writes_nothing() {
        let store = seeded();

        let err = BatchedCheckout
            .place(&store, 1, &lines(&[1, 2, 999, 3, 4]))
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::MissingProducts { ids: vec![999] });
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn test_naive_rereads_each_price() {
        let store = seeded();
        store.reset_round_trips();

        NaiveCheckout.place(&store, 1, &lines(&[1, 2])).await.unwrap();

        // user, header, 2 x (exists, price, insert), total update
        assert_eq!(store.round_trips(), 1 + 1 + 2 * 3 + 1);
    }

    #[tokio::test]
    async fn test_unknown_user_writes_nothing() {
        let store = seeded();
        for strategy in [&NaiveCheckout as &dyn CheckoutStrategy, &BatchedCheckout] {
            let err = strategy.place(&store, 42, &lines(&[1])).await.unwrap_err();
            assert_eq!(err, StorageError::UserNotFound { user_id: 42 });
        }
        assert_eq!(store.order_count(), 0);
    }

    #[test]
    fn test_strategy_selection_follows_mode() {
        assert_eq!(checkout_strategy(&ModeConfig::for_mode(Mode::Baseline)).name(), "naive");
        assert!(checkout_strategy(&ModeConfig::for_mode(Mode::Optimized)).is_atomic());
    }
}
