//! Testbed Telemetry - Observability Infrastructure
//!
//! Structured logging, Prometheus exposition, the request-recording
//! middleware that feeds the event recorder, and CSV export of recorded
//! samples.

pub mod export;
pub mod exposition;
pub mod middleware;
pub mod tracer;

use std::sync::Arc;

use testbed_core::{EventRecorder, RequestSample};

pub use export::{ExportError, ExportGuard, MetricsExporter};
pub use exposition::{prometheus_handler, TestbedMetrics};
pub use middleware::record_request_middleware;
pub use tracer::{init_tracer, TelemetryConfig};

use crate::error::ApiResult;

/// Recorder plus Prometheus collectors, cloned into every component that
/// reports events.
#[derive(Clone)]
pub struct Telemetry {
    pub recorder: Arc<EventRecorder>,
    pub metrics: Arc<TestbedMetrics>,
}

impl Telemetry {
    pub fn new(recorder: Arc<EventRecorder>) -> ApiResult<Self> {
        Ok(Self {
            recorder,
            metrics: Arc::new(TestbedMetrics::new()?),
        })
    }

    pub fn record_request(&self, sample: RequestSample) {
        self.metrics.record_http_request(
            &sample.method,
            &middleware::normalize_path(&sample.path),
            sample.status_code,
            sample.duration_ms / 1000.0,
        );
        self.recorder.record_request(sample);
    }

    pub fn cache_hit(&self) {
        self.recorder.record_cache_hit();
        self.metrics.record_cache_lookup(true);
    }

    pub fn cache_miss(&self) {
        self.recorder.record_cache_miss();
        self.metrics.record_cache_lookup(false);
    }
}
