//! PostgreSQL Data Store
//!
//! Connection pooling via deadpool-postgres and the `DataStore`
//! implementation used for real benchmark runs. Every statement is timed and
//! recorded as a query sample keyed by its SQL text, the same text the
//! in-memory store records for the equivalent call.
//!
//! Pool acquisition waits at most `TESTBED_DB_POOL_WAIT_MS`; a wait that
//! runs out surfaces as `StorageError::PoolTimeout`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use testbed_core::{
    distinct_product_ids, price_order, Cents, ConfigError, EventRecorder, Order, OrderId,
    OrderItem, OrderLine, OrderReceipt, OrderSummary, Product, ProductId, QuerySample,
    StorageError, StorageResult, User, UserId,
};
use testbed_storage::statements::*;
use testbed_storage::{DataStore, Page};
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long a request may wait for a free connection
    pub wait_timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "testbed".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            wait_timeout: Duration::from_millis(2_000),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from environment variables.
    ///
    /// - `TESTBED_DB_HOST`, `TESTBED_DB_PORT`, `TESTBED_DB_NAME`,
    ///   `TESTBED_DB_USER`, `TESTBED_DB_PASSWORD`
    /// - `TESTBED_DB_POOL_SIZE` (default: 16)
    /// - `TESTBED_DB_POOL_WAIT_MS` (default: 2000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: var("TESTBED_DB_HOST").unwrap_or(defaults.host),
            port: parse_var("TESTBED_DB_PORT", var("TESTBED_DB_PORT"), defaults.port)?,
            dbname: var("TESTBED_DB_NAME").unwrap_or(defaults.dbname),
            user: var("TESTBED_DB_USER").unwrap_or(defaults.user),
            password: var("TESTBED_DB_PASSWORD").unwrap_or(defaults.password),
            max_size: parse_var(
                "TESTBED_DB_POOL_SIZE",
                var("TESTBED_DB_POOL_SIZE"),
                defaults.max_size,
            )?,
            wait_timeout: Duration::from_millis(parse_var(
                "TESTBED_DB_POOL_WAIT_MS",
                var("TESTBED_DB_POOL_WAIT_MS"),
                defaults.wait_timeout.as_millis() as u64,
            )?),
            connect_timeout: defaults.connect_timeout,
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StorageResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.wait_timeout),
                create: Some(self.connect_timeout),
                recycle: Some(self.connect_timeout),
            },
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::ConnectionUnavailable {
                reason: format!("Failed to create pool: {}", e),
            })
    }
}

fn parse_var<T: std::str::FromStr>(
    field: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.clone(),
            reason: "expected a number".to_string(),
        }),
        None => Ok(default),
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn query_error(err: tokio_postgres::Error) -> StorageError {
    if err.is_closed() {
        return StorageError::ConnectionUnavailable {
            reason: err.to_string(),
        };
    }
    tracing::error!("Database error: {:?}", err);
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
}

fn pool_error(err: PoolError) -> StorageError {
    match err {
        PoolError::Timeout(_) => StorageError::PoolTimeout,
        PoolError::Backend(e) => query_error(e),
        other => {
            tracing::error!("Connection pool error: {:?}", other);
            StorageError::ConnectionUnavailable {
                reason: other.to_string(),
            }
        }
    }
}

fn tx_error(err: tokio_postgres::Error) -> StorageError {
    tracing::error!("Transaction error: {:?}", err);
    StorageError::TransactionFailed {
        reason: err.to_string(),
    }
}

// ============================================================================
// SQL
// ============================================================================

/// Escape LIKE metacharacters and wrap the term for a substring match.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn product_from_row(row: &Row) -> Result<Product, tokio_postgres::Error> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price_cents: row.try_get("price_cents")?,
    })
}

fn user_from_row(row: &Row) -> Result<User, tokio_postgres::Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
    })
}

fn order_from_row(row: &Row) -> Result<Order, tokio_postgres::Error> {
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        total_cents: row.try_get("total_cents")?,
        created_at: row.try_get("created_at")?,
    })
}

fn item_from_row(row: &Row) -> Result<OrderItem, tokio_postgres::Error> {
    Ok(OrderItem {
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        unit_price_cents: row.try_get("unit_price_cents")?,
    })
}

fn map_rows<T>(
    rows: &[Row],
    map: fn(&Row) -> Result<T, tokio_postgres::Error>,
) -> StorageResult<Vec<T>> {
    rows.iter().map(map).collect::<Result<_, _>>().map_err(query_error)
}

/// Fold joined order/item rows into summaries, keeping row order.
fn fold_history(rows: &[Row]) -> Result<Vec<OrderSummary>, tokio_postgres::Error> {
    let mut history: Vec<OrderSummary> = Vec::new();
    for row in rows {
        let order_id: OrderId = row.try_get(0)?;
        if history.last().map(|s| s.order.id) != Some(order_id) {
            history.push(OrderSummary {
                order: Order {
                    id: order_id,
                    user_id: row.try_get(1)?,
                    total_cents: row.try_get(2)?,
                    created_at: row.try_get(3)?,
                },
                items: Vec::new(),
            });
        }
        let product_id: Option<ProductId> = row.try_get(4)?;
        if let (Some(product_id), Some(summary)) = (product_id, history.last_mut()) {
            summary.items.push(OrderItem {
                order_id,
                product_id,
                quantity: row.try_get(5)?,
                unit_price_cents: row.try_get(6)?,
            });
        }
    }
    Ok(history)
}

// ============================================================================
// STORE
// ============================================================================

/// `DataStore` backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
    recorder: Arc<EventRecorder>,
}

impl PgStore {
    pub fn new(pool: Pool, recorder: Arc<EventRecorder>) -> Self {
        Self { pool, recorder }
    }

    pub fn from_config(config: &DbConfig, recorder: Arc<EventRecorder>) -> StorageResult<Self> {
        Ok(Self::new(config.create_pool()?, recorder))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Run one statement, recording its duration against the SQL text.
    async fn timed<T, F>(&self, sql: &str, statement: F) -> StorageResult<T>
    where
        F: Future<Output = Result<T, tokio_postgres::Error>>,
    {
        let started = Instant::now();
        let result = statement.await;
        self.recorder.record_query(QuerySample::new(
            sql,
            started.elapsed().as_secs_f64() * 1000.0,
        ));
        result.map_err(query_error)
    }
}

#[async_trait]
impl DataStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StorageResult<()> {
        let conn = self.conn().await?;
        self.timed(PING, conn.execute(PING, &[])).await?;
        Ok(())
    }

    async fn search_products(
        &self,
        term: &str,
        page: Option<Page>,
    ) -> StorageResult<Vec<Product>> {
        let conn = self.conn().await?;
        let pattern = like_pattern(term);
        let rows = match page {
            Some(page) => {
                let limit = i64::from(page.limit);
                let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
                self.timed(
                    SEARCH_PRODUCTS_PAGED,
                    conn.query(SEARCH_PRODUCTS_PAGED, &[&pattern, &limit, &offset]),
                )
                .await?
            }
            None => {
                self.timed(SEARCH_PRODUCTS, conn.query(SEARCH_PRODUCTS, &[&pattern]))
                    .await?
            }
        };
        map_rows(&rows, product_from_row)
    }

    async fn find_product(&self, id: ProductId) -> StorageResult<Option<Product>> {
        let conn = self.conn().await?;
        let row = self
            .timed(FIND_PRODUCT, conn.query_opt(FIND_PRODUCT, &[&id]))
            .await?;
        row.as_ref()
            .map(product_from_row)
            .transpose()
            .map_err(query_error)
    }

    async fn product_price(&self, id: ProductId) -> StorageResult<Option<Cents>> {
        let conn = self.conn().await?;
        let row = self
            .timed(PRODUCT_PRICE, conn.query_opt(PRODUCT_PRICE, &[&id]))
            .await?;
        row.map(|r| r.try_get::<_, Cents>(0))
            .transpose()
            .map_err(query_error)
    }

    async fn find_user(&self, id: UserId) -> StorageResult<Option<User>> {
        let conn = self.conn().await?;
        let row = self.timed(FIND_USER, conn.query_opt(FIND_USER, &[&id])).await?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(query_error)
    }

    async fn orders_for_user(&self, user_id: UserId) -> StorageResult<Vec<Order>> {
        let conn = self.conn().await?;
        let rows = self
            .timed(ORDERS_FOR_USER, conn.query(ORDERS_FOR_USER, &[&user_id]))
            .await?;
        map_rows(&rows, order_from_row)
    }

    async fn items_for_order(&self, order_id: OrderId) -> StorageResult<Vec<OrderItem>> {
        let conn = self.conn().await?;
        let rows = self
            .timed(ITEMS_FOR_ORDER, conn.query(ITEMS_FOR_ORDER, &[&order_id]))
            .await?;
        map_rows(&rows, item_from_row)
    }

    async fn order_history(&self, user_id: UserId) -> StorageResult<Vec<OrderSummary>> {
        let conn = self.conn().await?;
        let rows = self
            .timed(ORDER_HISTORY, conn.query(ORDER_HISTORY, &[&user_id]))
            .await?;
        fold_history(&rows).map_err(query_error)
    }

    async fn recommendations(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<Product>> {
        let conn = self.conn().await?;
        let exists = self
            .timed(USER_EXISTS, conn.query_opt(USER_EXISTS, &[&user_id]))
            .await?;
        if exists.is_none() {
            return Err(StorageError::UserNotFound { user_id });
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .timed(RECOMMENDATIONS, conn.query(RECOMMENDATIONS, &[&user_id, &limit]))
            .await?;
        if !rows.is_empty() {
            return map_rows(&rows, product_from_row);
        }

        let rows = self
            .timed(FIRST_PRODUCTS, conn.query(FIRST_PRODUCTS, &[&limit]))
            .await?;
        map_rows(&rows, product_from_row)
    }

    async fn insert_order(&self, user_id: UserId, total_cents: Cents) -> StorageResult<Order> {
        let conn = self.conn().await?;
        let row = self
            .timed(INSERT_ORDER, conn.query_one(INSERT_ORDER, &[&user_id, &total_cents]))
            .await?;
        order_from_row(&row).map_err(query_error)
    }

    async fn insert_order_item(&self, item: &OrderItem) -> StorageResult<()> {
        let conn = self.conn().await?;
        self.timed(
            INSERT_ORDER_ITEM,
            conn.execute(
                INSERT_ORDER_ITEM,
                &[
                    &item.order_id,
                    &item.product_id,
                    &item.quantity,
                    &item.unit_price_cents,
                ],
            ),
        )
        .await?;
        Ok(())
    }

    async fn update_order_total(&self, order_id: OrderId, total_cents: Cents) -> StorageResult<()> {
        let conn = self.conn().await?;
        self.timed(
            UPDATE_ORDER_TOTAL,
            conn.execute(UPDATE_ORDER_TOTAL, &[&order_id, &total_cents]),
        )
        .await?;
        Ok(())
    }

    async fn place_order_atomic(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
    ) -> StorageResult<OrderReceipt> {
        let mut conn = self.conn().await?;
        // Dropping `tx` without commit rolls back, including on cancellation.
        let tx = conn.transaction().await.map_err(tx_error)?;

        let exists = self
            .timed(USER_EXISTS, tx.query_opt(USER_EXISTS, &[&user_id]))
            .await?;
        if exists.is_none() {
            return Err(StorageError::UserNotFound { user_id });
        }

        let ids = distinct_product_ids(lines);
        let rows = self
            .timed(LOCK_PRODUCT_PRICES, tx.query(LOCK_PRODUCT_PRICES, &[&ids]))
            .await?;
        let prices: HashMap<ProductId, Cents> = rows
            .iter()
            .map(|r| Ok((r.try_get::<_, ProductId>(0)?, r.try_get::<_, Cents>(1)?)))
            .collect::<Result<_, tokio_postgres::Error>>()
            .map_err(query_error)?;
        let priced = price_order(user_id, lines, &prices)?;

        let header = self
            .timed(
                INSERT_ORDER,
                tx.query_one(INSERT_ORDER, &[&user_id, &priced.total_cents]),
            )
            .await?;
        let order = order_from_row(&header).map_err(query_error)?;

        let product_ids: Vec<ProductId> = priced.lines.iter().map(|l| l.product_id).collect();
        let quantities: Vec<i32> = priced.lines.iter().map(|l| l.quantity).collect();
        let unit_prices: Vec<Cents> = priced.lines.iter().map(|l| l.unit_price_cents).collect();
        self.timed(
            INSERT_ORDER_ITEMS_BATCH,
            tx.execute(
                INSERT_ORDER_ITEMS_BATCH,
                &[&order.id, &product_ids, &quantities, &unit_prices],
            ),
        )
        .await?;

        tx.commit().await.map_err(tx_error)?;

        Ok(OrderReceipt {
            order_id: order.id,
            user_id,
            total_cents: priced.total_cents,
            item_count: priced.lines.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("lamp"), "%lamp%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_default_db_config() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
        assert_eq!(config.wait_timeout, Duration::from_millis(2_000));
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("X", None, 7u16).unwrap(), 7);
        assert_eq!(parse_var("X", Some(" 42 ".to_string()), 7u16).unwrap(), 42);
        assert!(parse_var("X", Some("lots".to_string()), 7u16).is_err());
    }
}
