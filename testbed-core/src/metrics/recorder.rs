//! Event Recorder
//!
//! Append-only request and query series plus monotonic cache counters,
//! shared by all request handlers through an `Arc<EventRecorder>`.
//!
//! Recording is best-effort and infallible: invalid samples are dropped and
//! a poisoned lock is recovered, so metrics can never abort a request.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::stats::{compute_stats, StatsSnapshot};

/// Upper bound on stored query fingerprint length, in characters.
pub const MAX_FINGERPRINT_CHARS: usize = 100;

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Reduce query text to a bounded fingerprint.
///
/// Whitespace runs collapse to a single space, then the text is cut at
/// [`MAX_FINGERPRINT_CHARS`] characters.
pub fn fingerprint(query: &str) -> String {
    query
        .split_whitespace()
        .flat_map(|word| std::iter::once(' ').chain(word.chars()))
        .skip(1)
        .take(MAX_FINGERPRINT_CHARS)
        .collect()
}

/// One completed inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    pub method: String,
    pub path: String,
    pub duration_ms: f64,
    pub status_code: u16,
    pub timestamp_ms: i64,
}

impl RequestSample {
    /// Sample stamped with the current time.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        duration_ms: f64,
        status_code: u16,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            duration_ms,
            status_code,
            timestamp_ms: now_ms(),
        }
    }

    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Status 400 and above counts as an error.
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// One data-store round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySample {
    pub fingerprint: String,
    pub duration_ms: f64,
    pub timestamp_ms: i64,
}

impl QuerySample {
    /// Sample for the given query text, stamped with the current time.
    pub fn new(query: &str, duration_ms: f64) -> Self {
        Self {
            fingerprint: fingerprint(query),
            duration_ms,
            timestamp_ms: now_ms(),
        }
    }
}

/// Point-in-time copy of everything the recorder holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorderSnapshot {
    pub requests: Vec<RequestSample>,
    pub queries: Vec<QuerySample>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Default)]
struct Series {
    requests: Vec<RequestSample>,
    queries: Vec<QuerySample>,
    cache_hits: u64,
    cache_misses: u64,
}

/// Shared, concurrency-safe event sink.
#[derive(Debug, Default)]
pub struct EventRecorder {
    series: RwLock<Series>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Series> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Series> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a request sample. Negative or non-finite durations are dropped.
    pub fn record_request(&self, sample: RequestSample) {
        if !valid_duration(sample.duration_ms) {
            tracing::debug!(
                path = %sample.path,
                duration_ms = sample.duration_ms,
                "Dropping request sample with invalid duration"
            );
            return;
        }
        self.write().requests.push(sample);
    }

    /// Append a query sample, bounding its fingerprint.
    pub fn record_query(&self, mut sample: QuerySample) {
        if !valid_duration(sample.duration_ms) {
            tracing::debug!(
                fingerprint = %sample.fingerprint,
                duration_ms = sample.duration_ms,
                "Dropping query sample with invalid duration"
            );
            return;
        }
        if sample.fingerprint.chars().count() > MAX_FINGERPRINT_CHARS {
            sample.fingerprint = sample
                .fingerprint
                .chars()
                .take(MAX_FINGERPRINT_CHARS)
                .collect();
        }
        self.write().queries.push(sample);
    }

    pub fn record_cache_hit(&self) {
        self.write().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.write().cache_misses += 1;
    }

    /// Drop every sample and zero the cache counters.
    pub fn reset(&self) {
        *self.write() = Series::default();
        tracing::info!("Metrics recorder reset");
    }

    /// Copy of the request series in insertion order.
    pub fn request_samples(&self) -> Vec<RequestSample> {
        self.read().requests.clone()
    }

    /// Copy of the query series in insertion order.
    pub fn query_samples(&self) -> Vec<QuerySample> {
        self.read().queries.clone()
    }

    /// `(hits, misses)` as of now.
    pub fn cache_counts(&self) -> (u64, u64) {
        let series = self.read();
        (series.cache_hits, series.cache_misses)
    }

    /// Consistent copy of all series and counters, taken under one lock.
    pub fn snapshot(&self) -> RecorderSnapshot {
        let series = self.read();
        RecorderSnapshot {
            requests: series.requests.clone(),
            queries: series.queries.clone(),
            cache_hits: series.cache_hits,
            cache_misses: series.cache_misses,
        }
    }

    /// Statistics over a snapshot; never mutates the recorder.
    pub fn compute_stats(&self) -> StatsSnapshot {
        compute_stats(&self.snapshot())
    }
}

fn valid_duration(duration_ms: f64) -> bool {
    duration_ms.is_finite() && duration_ms >= 0.0
}
