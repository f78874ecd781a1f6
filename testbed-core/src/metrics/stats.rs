//! Stats Aggregator
//!
//! Pure summary statistics over a [`RecorderSnapshot`]. Every field is
//! rounded to two decimals, and an empty snapshot yields all zeros.

use serde::{Deserialize, Serialize};

use super::recorder::RecorderSnapshot;

/// Percentile reported as the tail latency.
const TAIL_PERCENTILE: u32 = 95;

/// Summary statistics for external reporting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub request_count: u64,
    /// Requests that completed with status >= 400.
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub throughput_per_second: f64,
    pub avg_db_time_ms: f64,
    pub cache_hit_ratio_percent: f64,
}

/// Round to two decimal places. Non-finite input becomes 0.
pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        0.0
    }
}

/// Nearest-rank percentile over ascending `sorted` values.
///
/// Index is `ceil(percent / 100 * n) - 1`, clamped to `[0, n - 1]`. The rank
/// is computed in integer arithmetic so whole percentages are exact.
pub fn nearest_rank_percentile(sorted: &[f64], percent: u32) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let percent = percent.min(100) as usize;
    let rank = (percent * n).div_ceil(100);
    let index = rank.saturating_sub(1).min(n - 1);
    Some(sorted[index])
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let count = values.len();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

/// Requests per second between the earliest and latest request timestamps.
fn throughput(snapshot: &RecorderSnapshot) -> f64 {
    let n = snapshot.requests.len();
    if n < 2 {
        return 0.0;
    }
    let timestamps = snapshot.requests.iter().map(|s| s.timestamp_ms);
    let (first, last) = timestamps.fold((i64::MAX, i64::MIN), |(lo, hi), ts| {
        (lo.min(ts), hi.max(ts))
    });
    let elapsed_secs = (last - first) as f64 / 1000.0;
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (n - 1) as f64 / elapsed_secs
}

fn hit_ratio_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64 * 100.0
}

/// Derive the rounded statistics snapshot.
pub fn compute_stats(snapshot: &RecorderSnapshot) -> StatsSnapshot {
    let mut latencies: Vec<f64> = snapshot.requests.iter().map(|s| s.duration_ms).collect();
    latencies.sort_by(f64::total_cmp);

    let error_count = snapshot.requests.iter().filter(|s| s.is_error()).count() as u64;

    StatsSnapshot {
        request_count: snapshot.requests.len() as u64,
        error_count,
        avg_latency_ms: round2(mean(latencies.iter().copied())),
        p95_latency_ms: round2(
            nearest_rank_percentile(&latencies, TAIL_PERCENTILE).unwrap_or(0.0),
        ),
        throughput_per_second: round2(throughput(snapshot)),
        avg_db_time_ms: round2(mean(snapshot.queries.iter().map(|q| q.duration_ms))),
        cache_hit_ratio_percent: round2(hit_ratio_percent(
            snapshot.cache_hits,
            snapshot.cache_misses,
        )),
    }
}
