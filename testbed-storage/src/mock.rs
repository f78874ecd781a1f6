//! In-memory `DataStore` for tests and database-free runs.
//!
//! Each call counts as one round-trip: it optionally sleeps for a fixed
//! latency, bumps a counter and, when a recorder is attached, records a query
//! sample for each SQL statement `PgStore` would issue for the same call (see
//! [`crate::statements`]). All locking happens after the sleep, so a call
//! cancelled while "in flight" has applied nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use testbed_core::{
    distinct_product_ids, price_order, Cents, EventRecorder, Order, OrderId, OrderItem,
    OrderLine, OrderReceipt, OrderSummary, Product, ProductId, QuerySample, StorageError,
    StorageResult, User, UserId,
};

use crate::statements::*;
use crate::{DataStore, Page};

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    users: BTreeMap<UserId, User>,
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
    last_order_id: OrderId,
}

impl Tables {
    fn user_orders(&self, user_id: UserId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }

    fn order_items(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect()
    }

    fn new_order(&mut self, user_id: UserId, total_cents: Cents) -> Order {
        self.last_order_id += 1;
        let order = Order {
            id: self.last_order_id,
            user_id,
            total_cents,
            created_at: Utc::now(),
        };
        self.orders.insert(order.id, order.clone());
        order
    }
}

/// In-memory mock store.
#[derive(Debug)]
pub struct MockStore {
    tables: RwLock<Tables>,
    latency: Duration,
    recorder: Option<Arc<EventRecorder>>,
    available: AtomicBool,
    round_trips: AtomicU64,
    /// Item inserts still allowed before injected failures start.
    item_insert_budget: Mutex<Option<usize>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            latency: Duration::ZERO,
            recorder: None,
            available: AtomicBool::new(true),
            round_trips: AtomicU64::new(0),
            item_insert_budget: Mutex::new(None),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long on every round-trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Record a query sample per round-trip.
    pub fn with_recorder(mut self, recorder: Arc<EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    pub fn insert_product(&self, product: Product) -> StorageResult<()> {
        self.write()?.products.insert(product.id, product);
        Ok(())
    }

    pub fn insert_user(&self, user: User) -> StorageResult<()> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    // ========================================================================
    // FAULT INJECTION
    // ========================================================================

    /// Toggle reachability; while unavailable every call fails with
    /// `ConnectionUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Let `n` more order items be written, then fail every further item
    /// write with `QueryFailed`. A batched write that would exceed the budget
    /// fails as a whole.
    pub fn fail_item_inserts_after(&self, n: usize) {
        if let Ok(mut budget) = self.item_insert_budget.lock() {
            *budget = Some(n);
        }
    }

    /// Remove any injected item-write failure.
    pub fn clear_failures(&self) {
        if let Ok(mut budget) = self.item_insert_budget.lock() {
            *budget = None;
        }
    }

    fn take_item_budget(&self, count: usize) -> StorageResult<()> {
        let mut budget = self
            .item_insert_budget
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        match budget.as_mut() {
            Some(remaining) if *remaining < count => Err(StorageError::QueryFailed {
                reason: "injected order_items insert failure".to_string(),
            }),
            Some(remaining) => {
                *remaining -= count;
                Ok(())
            }
            None => Ok(()),
        }
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Round-trips served since creation or the last reset.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn reset_round_trips(&self) {
        self.round_trips.store(0, Ordering::SeqCst);
    }

    pub fn orders(&self) -> StorageResult<Vec<Order>> {
        Ok(self.read()?.orders.values().cloned().collect())
    }

    pub fn items(&self) -> StorageResult<Vec<OrderItem>> {
        Ok(self.read()?.items.clone())
    }

    pub fn order_count(&self) -> usize {
        self.read().map(|t| t.orders.len()).unwrap_or(0)
    }

    pub fn item_count(&self) -> usize {
        self.read().map(|t| t.items.len()).unwrap_or(0)
    }

    // ========================================================================
    // ROUND-TRIP ACCOUNTING
    // ========================================================================

    async fn begin(&self) -> StorageResult<Instant> {
        let started = Instant::now();
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionUnavailable {
                reason: "mock store is offline".to_string(),
            });
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        Ok(started)
    }

    /// Record one query sample per statement, splitting the round-trip time
    /// evenly between them.
    fn finish(&self, statements: &[&str], started: Instant) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        if statements.is_empty() {
            return;
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let share = elapsed_ms / statements.len() as f64;
        for statement in statements {
            recorder.record_query(QuerySample::new(statement, share));
        }
    }

    // ========================================================================
    // MULTI-STATEMENT OPERATIONS
    // ========================================================================

    /// `steps` ends at the number of `RECOMMENDATION_STATEMENTS` issued.
    fn pick_recommendations(
        &self,
        user_id: UserId,
        limit: usize,
        steps: &mut usize,
    ) -> StorageResult<Vec<Product>> {
        let tables = self.read()?;
        if !tables.users.contains_key(&user_id) {
            return Err(StorageError::UserNotFound { user_id });
        }
        *steps = 2;

        let order_ids: BTreeSet<OrderId> = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.id)
            .collect();
        let purchased: BTreeSet<ProductId> = tables
            .items
            .iter()
            .filter(|i| order_ids.contains(&i.order_id))
            .map(|i| i.product_id)
            .collect();
        let categories: BTreeSet<&str> = purchased
            .iter()
            .filter_map(|id| tables.products.get(id))
            .map(|p| p.category.as_str())
            .collect();

        let mut picks: Vec<Product> = tables
            .products
            .values()
            .filter(|p| categories.contains(p.category.as_str()))
            .filter(|p| !purchased.contains(&p.id))
            .cloned()
            .collect();
        picks.sort_by(|a, b| b.price_cents.cmp(&a.price_cents).then(a.id.cmp(&b.id)));
        picks.truncate(limit);

        if picks.is_empty() {
            *steps = 3;
            picks = tables.products.values().take(limit).cloned().collect();
        }
        Ok(picks)
    }

    /// Validate and apply a whole order under one write lock. `steps` ends at
    /// the number of `ATOMIC_ORDER_STATEMENTS` issued.
    fn apply_order(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
        steps: &mut usize,
    ) -> StorageResult<OrderReceipt> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user_id) {
            return Err(StorageError::UserNotFound { user_id });
        }
        *steps = 2;

        let prices: HashMap<ProductId, Cents> = distinct_product_ids(lines)
            .into_iter()
            .filter_map(|id| tables.products.get(&id).map(|p| (id, p.price_cents)))
            .collect();
        let priced = price_order(user_id, lines, &prices)?;
        *steps = 4;
        self.take_item_budget(priced.lines.len())?;

        let order = tables.new_order(user_id, priced.total_cents);
        tables.items.extend(priced.lines.iter().map(|line| OrderItem {
            order_id: order.id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
        }));

        Ok(OrderReceipt {
            order_id: order.id,
            user_id,
            total_cents: priced.total_cents,
            item_count: priced.lines.len(),
        })
    }
}

/// Statements `PgStore::recommendations` issues, in order.
const RECOMMENDATION_STATEMENTS: [&str; 3] = [USER_EXISTS, RECOMMENDATIONS, FIRST_PRODUCTS];

/// Statements `PgStore::place_order_atomic` issues inside its transaction.
const ATOMIC_ORDER_STATEMENTS: [&str; 4] = [
    USER_EXISTS,
    LOCK_PRODUCT_PRICES,
    INSERT_ORDER,
    INSERT_ORDER_ITEMS_BATCH,
];

#[async_trait]
impl DataStore for MockStore {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    async fn ping(&self) -> StorageResult<()> {
        let started = self.begin().await?;
        self.finish(&[PING], started);
        Ok(())
    }

    async fn search_products(
        &self,
        term: &str,
        page: Option<Page>,
    ) -> StorageResult<Vec<Product>> {
        let started = self.begin().await?;
        let needle = term.to_lowercase();
        let matches = {
            let tables = self.read()?;
            let hits = tables
                .products
                .values()
                .filter(|p| p.name.to_lowercase().contains(&needle))
                .cloned();
            match page {
                Some(page) => hits
                    .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
                    .take(page.limit as usize)
                    .collect(),
                None => hits.collect::<Vec<_>>(),
            }
        };
        let statement = if page.is_some() {
            SEARCH_PRODUCTS_PAGED
        } else {
            SEARCH_PRODUCTS
        };
        self.finish(&[statement], started);
        Ok(matches)
    }

    async fn find_product(&self, id: ProductId) -> StorageResult<Option<Product>> {
        let started = self.begin().await?;
        let product = self.read()?.products.get(&id).cloned();
        self.finish(&[FIND_PRODUCT], started);
        Ok(product)
    }

    async fn product_price(&self, id: ProductId) -> StorageResult<Option<Cents>> {
        let started = self.begin().await?;
        let price = self.read()?.products.get(&id).map(|p| p.price_cents);
        self.finish(&[PRODUCT_PRICE], started);
        Ok(price)
    }

    async fn find_user(&self, id: UserId) -> StorageResult<Option<User>> {
        let started = self.begin().await?;
        let user = self.read()?.users.get(&id).cloned();
        self.finish(&[FIND_USER], started);
        Ok(user)
    }

    async fn orders_for_user(&self, user_id: UserId) -> StorageResult<Vec<Order>> {
        let started = self.begin().await?;
        let orders = self.read()?.user_orders(user_id);
        self.finish(&[ORDERS_FOR_USER], started);
        Ok(orders)
    }

    async fn items_for_order(&self, order_id: OrderId) -> StorageResult<Vec<OrderItem>> {
        let started = self.begin().await?;
        let items = self.read()?.order_items(order_id);
        self.finish(&[ITEMS_FOR_ORDER], started);
        Ok(items)
    }

    async fn order_history(&self, user_id: UserId) -> StorageResult<Vec<OrderSummary>> {
        let started = self.begin().await?;
        let history = {
            let tables = self.read()?;
            tables
                .user_orders(user_id)
                .into_iter()
                .map(|order| {
                    let items = tables.order_items(order.id);
                    OrderSummary { order, items }
                })
                .collect()
        };
        self.finish(&[ORDER_HISTORY], started);
        Ok(history)
    }

    async fn recommendations(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<Product>> {
        let started = self.begin().await?;
        let mut steps = 1;
        let picks = self.pick_recommendations(user_id, limit, &mut steps);
        self.finish(&RECOMMENDATION_STATEMENTS[..steps], started);
        picks
    }

    async fn insert_order(&self, user_id: UserId, total_cents: Cents) -> StorageResult<Order> {
        let started = self.begin().await?;
        let order = self.write().and_then(|mut tables| {
            if !tables.users.contains_key(&user_id) {
                return Err(StorageError::UserNotFound { user_id });
            }
            Ok(tables.new_order(user_id, total_cents))
        });
        self.finish(&[INSERT_ORDER], started);
        order
    }

    async fn insert_order_item(&self, item: &OrderItem) -> StorageResult<()> {
        let started = self.begin().await?;
        let inserted = self.write().and_then(|mut tables| {
            if !tables.orders.contains_key(&item.order_id) {
                return Err(StorageError::QueryFailed {
                    reason: format!("order {} does not exist", item.order_id),
                });
            }
            if !tables.products.contains_key(&item.product_id) {
                return Err(StorageError::MissingProducts {
                    ids: vec![item.product_id],
                });
            }
            self.take_item_budget(1)?;
            tables.items.push(item.clone());
            Ok(())
        });
        self.finish(&[INSERT_ORDER_ITEM], started);
        inserted
    }

    async fn update_order_total(&self, order_id: OrderId, total_cents: Cents) -> StorageResult<()> {
        let started = self.begin().await?;
        let updated = self.write().and_then(|mut tables| {
            let order = tables
                .orders
                .get_mut(&order_id)
                .ok_or_else(|| StorageError::QueryFailed {
                    reason: format!("order {} does not exist", order_id),
                })?;
            order.total_cents = total_cents;
            Ok(())
        });
        self.finish(&[UPDATE_ORDER_TOTAL], started);
        updated
    }

    async fn place_order_atomic(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
    ) -> StorageResult<OrderReceipt> {
        let started = self.begin().await?;
        let mut steps = 1;
        let receipt = self.apply_order(user_id, lines, &mut steps);
        self.finish(&ATOMIC_ORDER_STATEMENTS[..steps], started);
        receipt
    }
}
