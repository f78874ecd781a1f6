//! Write-path behavior of the two checkout strategies.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use support::{app, TestAppBuilder};
use testbed_core::Mode;
use testbed_storage::seeded_price;

#[tokio::test]
async fn baseline_leaves_items_before_a_missing_product() {
    let app = app(Mode::Baseline);

    let response = app
        .checkout(1, &[(1, 1), (2, 1), (99_999, 1), (3, 1), (4, 1)])
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let items = app.store.items().unwrap();
    let persisted: Vec<i64> = items.iter().map(|i| i.product_id).collect();
    assert_eq!(persisted, vec![1, 2]);

    let orders = app.store.orders().unwrap();
    assert_eq!(orders.len(), 1);
    // The total update never ran.
    assert_eq!(orders[0].total_cents, 0);
}

#[tokio::test]
async fn optimized_missing_product_leaves_nothing() {
    let app = app(Mode::Optimized);

    let response = app
        .checkout(1, &[(1, 1), (2, 1), (99_999, 1), (3, 1), (4, 1)])
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.order_count(), 0);
    assert_eq!(app.store.item_count(), 0);
}

#[tokio::test]
async fn both_strategies_compute_the_same_total() {
    let items = [(3, 2), (8, 1), (13, 4)];
    let expected: i64 = items
        .iter()
        .map(|&(id, qty)| seeded_price(id) * i64::from(qty))
        .sum();

    for mode in [Mode::Baseline, Mode::Optimized] {
        let app = app(mode);
        let response = app.checkout(2, &items).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.value()["total_cents"], expected);
        assert_eq!(app.store.orders().unwrap()[0].total_cents, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_optimized_checkouts_are_never_half_applied() {
    let app = Arc::new(
        TestAppBuilder::new(Mode::Optimized)
            .store_latency(Duration::from_millis(2))
            .build(),
    );

    let mut handles = Vec::new();
    for i in 0..40i64 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let user = (i % 20) + 1;
            // Every fourth order references a product that does not exist.
            let missing = if i % 4 == 0 { 99_999 } else { 50 + i };
            let items = [(i + 1, 1), (i + 2, 2), (missing, 1)];
            app.checkout(user, &items).await.status
        }));
    }

    let mut created = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        assert!(status == StatusCode::CREATED || status == StatusCode::NOT_FOUND);
        if status == StatusCode::CREATED {
            created += 1;
        }
    }
    assert_eq!(created, 30);

    let orders = app.store.orders().unwrap();
    let items = app.store.items().unwrap();
    assert_eq!(orders.len(), 30);
    assert_eq!(items.len(), 30 * 3);

    let mut per_order: HashMap<i64, Vec<_>> = HashMap::new();
    for item in &items {
        per_order.entry(item.order_id).or_default().push(item);
    }
    for order in &orders {
        let lines = &per_order[&order.id];
        assert_eq!(lines.len(), 3);
        let total: i64 = lines
            .iter()
            .map(|l| l.unit_price_cents * i64::from(l.quantity))
            .sum();
        assert_eq!(order.total_cents, total);
    }
}

#[tokio::test]
async fn timed_out_optimized_checkout_writes_nothing() {
    let app = TestAppBuilder::new(Mode::Optimized)
        .store_latency(Duration::from_millis(200))
        .request_timeout(Duration::from_millis(20))
        .build();

    let response = app.checkout(1, &[(1, 1), (2, 1)]).await;
    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.value()["code"], "TIMEOUT");

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(app.store.order_count(), 0);
    assert_eq!(app.store.item_count(), 0);
}
