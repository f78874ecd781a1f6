//! Property tests across the write strategies and the stats endpoint.

use std::sync::Arc;

use proptest::prelude::*;
use testbed_api::services::{BatchedCheckout, CheckoutStrategy, NaiveCheckout};
use testbed_core::{compute_stats, nearest_rank_percentile, EventRecorder};
use testbed_test_utils::fixtures::{lines, samples_with_durations, seeded_store, SMALL_CATALOG};
use testbed_test_utils::generators::{arb_durations, arb_order_lines, arb_request_sample};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_strategies_persist_identical_orders(
        order in arb_order_lines(SMALL_CATALOG.products as i64, 10),
        user in 1i64..=SMALL_CATALOG.users as i64,
    ) {
        let rt = runtime();
        let naive_store = seeded_store();
        let batched_store = seeded_store();

        let (naive, batched) = rt.block_on(async {
            (
                NaiveCheckout.place(&naive_store, user, &order).await,
                BatchedCheckout.place(&batched_store, user, &order).await,
            )
        });

        prop_assert_eq!(naive.unwrap(), batched.unwrap());
        prop_assert_eq!(naive_store.items().unwrap(), batched_store.items().unwrap());
        let naive_total = naive_store.orders().unwrap()[0].total_cents;
        let batched_total = batched_store.orders().unwrap()[0].total_cents;
        prop_assert_eq!(naive_total, batched_total);
    }

    #[test]
    fn prop_batched_failure_is_all_or_nothing(
        valid in prop::collection::vec(1i64..=SMALL_CATALOG.products as i64, 0..8),
        insert_at in 0usize..8,
    ) {
        let rt = runtime();
        let store = seeded_store();
        let mut ids = valid.clone();
        ids.insert(insert_at.min(ids.len()), 1_000_000);

        let result = rt.block_on(BatchedCheckout.place(&store, 1, &lines(&ids)));

        prop_assert!(result.is_err());
        prop_assert_eq!(store.order_count(), 0);
        prop_assert_eq!(store.item_count(), 0);
    }

    #[test]
    fn prop_stats_count_every_sample(samples in prop::collection::vec(arb_request_sample(), 0..100)) {
        let recorder = Arc::new(EventRecorder::new());
        for sample in &samples {
            recorder.record_request(sample.clone());
        }

        let stats = recorder.compute_stats();
        prop_assert_eq!(stats.request_count, samples.len() as u64);
        prop_assert_eq!(
            stats.error_count,
            samples.iter().filter(|s| s.status_code >= 400).count() as u64
        );
    }

    #[test]
    fn prop_p95_matches_nearest_rank(durations in arb_durations(200)) {
        let recorder = EventRecorder::new();
        for sample in samples_with_durations(&durations) {
            recorder.record_request(sample);
        }

        let mut sorted = durations.clone();
        sorted.sort_by(f64::total_cmp);
        let rank = (95 * sorted.len()).div_ceil(100).clamp(1, sorted.len());
        let expected = sorted[rank - 1];

        let stats = compute_stats(&recorder.snapshot());
        prop_assert!((stats.p95_latency_ms - (expected * 100.0).round() / 100.0).abs() < 1e-9);
        prop_assert_eq!(nearest_rank_percentile(&sorted, 95), Some(expected));
    }
}
