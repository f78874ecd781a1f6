//! SQL statement text.
//!
//! The PostgreSQL store executes these statements and records each one as
//! the fingerprint of its query sample. `MockStore` records the same text for
//! the equivalent in-memory operation, so per-statement DB timings group the
//! same way whichever backend served them.

pub const PING: &str = "SELECT 1";

pub const SEARCH_PRODUCTS: &str = "SELECT id, name, category, price_cents FROM products \
     WHERE name ILIKE $1 ESCAPE '\\' ORDER BY id";

pub const SEARCH_PRODUCTS_PAGED: &str = "SELECT id, name, category, price_cents FROM products \
     WHERE name ILIKE $1 ESCAPE '\\' ORDER BY id LIMIT $2 OFFSET $3";

pub const FIND_PRODUCT: &str = "SELECT id, name, category, price_cents FROM products WHERE id = $1";

pub const PRODUCT_PRICE: &str = "SELECT price_cents FROM products WHERE id = $1";

pub const FIND_USER: &str = "SELECT id, name, email FROM users WHERE id = $1";

pub const ORDERS_FOR_USER: &str = "SELECT id, user_id, total_cents, created_at FROM orders \
     WHERE user_id = $1 ORDER BY created_at DESC, id DESC";

pub const ITEMS_FOR_ORDER: &str = "SELECT order_id, product_id, quantity, unit_price_cents \
     FROM order_items WHERE order_id = $1 ORDER BY id";

pub const ORDER_HISTORY: &str = "SELECT o.id, o.user_id, o.total_cents, o.created_at, \
     i.product_id, i.quantity, i.unit_price_cents \
     FROM orders o LEFT JOIN order_items i ON i.order_id = o.id \
     WHERE o.user_id = $1 ORDER BY o.created_at DESC, o.id DESC, i.id";

pub const RECOMMENDATIONS: &str = "WITH purchased AS ( \
         SELECT DISTINCT i.product_id FROM order_items i \
         JOIN orders o ON o.id = i.order_id WHERE o.user_id = $1 \
     ), categories AS ( \
         SELECT DISTINCT p.category FROM products p \
         JOIN purchased pu ON pu.product_id = p.id \
     ) \
     SELECT p.id, p.name, p.category, p.price_cents FROM products p \
     WHERE p.category IN (SELECT category FROM categories) \
       AND p.id NOT IN (SELECT product_id FROM purchased) \
     ORDER BY p.price_cents DESC, p.id ASC LIMIT $2";

pub const FIRST_PRODUCTS: &str =
    "SELECT id, name, category, price_cents FROM products ORDER BY id LIMIT $1";

pub const USER_EXISTS: &str = "SELECT 1 FROM users WHERE id = $1";

pub const INSERT_ORDER: &str = "INSERT INTO orders (user_id, total_cents) VALUES ($1, $2) \
     RETURNING id, user_id, total_cents, created_at";

pub const INSERT_ORDER_ITEM: &str = "INSERT INTO order_items \
     (order_id, product_id, quantity, unit_price_cents) VALUES ($1, $2, $3, $4)";

pub const UPDATE_ORDER_TOTAL: &str = "UPDATE orders SET total_cents = $2 WHERE id = $1";

pub const LOCK_PRODUCT_PRICES: &str =
    "SELECT id, price_cents FROM products WHERE id = ANY($1) FOR SHARE";

pub const INSERT_ORDER_ITEMS_BATCH: &str = "INSERT INTO order_items \
     (order_id, product_id, quantity, unit_price_cents) \
     SELECT $1, * FROM UNNEST($2::bigint[], $3::int[], $4::bigint[])";
