//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use testbed_core::{EventRecorder, ModeConfig};

use crate::services::Services;
use crate::telemetry::{MetricsExporter, Telemetry, TestbedMetrics};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Mode resolved at startup; never changes afterwards.
    pub mode: ModeConfig,
    pub services: Services,
    pub telemetry: Telemetry,
    pub exporter: MetricsExporter,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(mode: ModeConfig, services: Services, telemetry: Telemetry, exporter: MetricsExporter) -> Self {
        Self {
            mode,
            services,
            telemetry,
            exporter,
            start_time: Instant::now(),
        }
    }

    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.telemetry.recorder
    }
}

crate::impl_from_ref!(ModeConfig, mode);
crate::impl_from_ref!(Services, services);
crate::impl_from_ref!(Telemetry, telemetry);
crate::impl_from_ref!(MetricsExporter, exporter);
crate::impl_from_ref!(Arc<EventRecorder>, telemetry.recorder);
crate::impl_from_ref!(Arc<TestbedMetrics>, telemetry.metrics);
