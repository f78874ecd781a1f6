//! Shop entity structures and order pricing

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Product identifier (BIGSERIAL in the reference schema).
pub type ProductId = i64;

/// User identifier.
pub type UserId = i64;

/// Order identifier.
pub type OrderId = i64;

/// Monetary amount in cents.
pub type Cents = i64;

/// Product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price_cents: Cents,
}

/// Registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// Order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_cents: Cents,
    pub created_at: DateTime<Utc>,
}

/// Persisted order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price_cents: Cents,
}

/// Requested line of a checkout, before prices are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Order line with its unit price resolved from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price_cents: Cents,
}

impl PricedLine {
    /// Line subtotal.
    pub fn subtotal(&self) -> Cents {
        self.unit_price_cents * Cents::from(self.quantity)
    }
}

/// Fully priced order, ready to be written in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    pub user_id: UserId,
    pub lines: Vec<PricedLine>,
    pub total_cents: Cents,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_cents: Cents,
    pub item_count: usize,
}

/// Order with its items, as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// User dashboard: profile plus order history (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub user: User,
    pub orders: Vec<OrderSummary>,
}

/// Price an order from a single batched catalog read.
///
/// `prices` holds whatever the batched read returned. Every requested product
/// must be present; the missing ids are reported in request order, without
/// duplicates.
pub fn price_order(
    user_id: UserId,
    lines: &[OrderLine],
    prices: &HashMap<ProductId, Cents>,
) -> Result<PricedOrder, StorageError> {
    let mut missing: Vec<ProductId> = Vec::new();
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        match prices.get(&line.product_id) {
            Some(&unit_price_cents) => priced.push(PricedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price_cents,
            }),
            None => {
                if !missing.contains(&line.product_id) {
                    missing.push(line.product_id);
                }
            }
        }
    }

    if !missing.is_empty() {
        return Err(StorageError::MissingProducts { ids: missing });
    }

    let total_cents = priced.iter().map(PricedLine::subtotal).sum();
    Ok(PricedOrder {
        user_id,
        lines: priced,
        total_cents,
    })
}

/// Distinct product ids referenced by the lines, in first-seen order.
pub fn distinct_product_ids(lines: &[OrderLine]) -> Vec<ProductId> {
    let mut ids = Vec::with_capacity(lines.len());
    for line in lines {
        if !ids.contains(&line.product_id) {
            ids.push(line.product_id);
        }
    }
    ids
}
