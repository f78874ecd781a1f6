//! CSV export of recorded metrics.
//!
//! An export file has two sections in one CSV document: a `Metric,Value`
//! summary taken from the stats aggregator, followed by every recorded
//! request sample. Summary labels are the ones the results scripts match
//! on (`Avg Latency`, `P95 Latency`, `Throughput`, `Cache Hit Ratio`). Files are written to
//! `{results_dir}/{mode}/metrics-{unix_ms}.csv`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use testbed_core::{now_ms, EventRecorder, RequestSample, StatsSnapshot};
use thiserror::Error;

use crate::error::ApiError;

const SUMMARY_HEADER: [&str; 2] = ["Metric", "Value"];
const REQUEST_HEADER: [&str; 5] = ["method", "path", "duration_ms", "status_code", "timestamp_ms"];

/// Failure while writing an export file.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to prepare export directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write export file: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush export file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

/// Writes recorder contents to CSV files for one mode.
#[derive(Clone)]
pub struct MetricsExporter {
    results_dir: PathBuf,
    mode: &'static str,
    recorder: Arc<EventRecorder>,
}

impl MetricsExporter {
    pub fn new(results_dir: impl Into<PathBuf>, mode: &'static str, recorder: Arc<EventRecorder>) -> Self {
        Self {
            results_dir: results_dir.into(),
            mode,
            recorder,
        }
    }

    /// Directory export files for the active mode are written to.
    pub fn mode_dir(&self) -> PathBuf {
        self.results_dir.join(self.mode)
    }

    /// Write the current recorder contents and return the file path.
    pub fn export(&self) -> Result<PathBuf, ExportError> {
        let snapshot = self.recorder.snapshot();
        let stats = testbed_core::compute_stats(&snapshot);

        let dir = self.mode_dir();
        fs::create_dir_all(&dir).map_err(|source| ExportError::Directory {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("metrics-{}.csv", now_ms()));
        write_export(&path, &stats, &snapshot.requests)?;

        tracing::info!(
            path = %path.display(),
            requests = snapshot.requests.len(),
            "Metrics exported"
        );
        Ok(path)
    }
}

fn write_export(path: &Path, stats: &StatsSnapshot, requests: &[RequestSample]) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_writer(file);

    writer.write_record(SUMMARY_HEADER)?;
    for (metric, value) in summary_rows(stats) {
        writer.write_record([metric, value.as_str()])?;
    }

    writer.write_record(REQUEST_HEADER)?;
    for sample in requests {
        writer.write_record([
            sample.method.clone(),
            sample.path.clone(),
            sample.duration_ms.to_string(),
            sample.status_code.to_string(),
            sample.timestamp_ms.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn summary_rows(stats: &StatsSnapshot) -> [(&'static str, String); 7] {
    [
        ("Total Requests", stats.request_count.to_string()),
        ("Errors", stats.error_count.to_string()),
        ("Avg Latency (ms)", stats.avg_latency_ms.to_string()),
        ("P95 Latency (ms)", stats.p95_latency_ms.to_string()),
        ("Throughput (req/s)", stats.throughput_per_second.to_string()),
        ("Avg DB Time (ms)", stats.avg_db_time_ms.to_string()),
        ("Cache Hit Ratio (%)", stats.cache_hit_ratio_percent.to_string()),
    ]
}

// ============================================================================
// SHUTDOWN FLUSH
// ============================================================================

/// Flushes one export at shutdown.
///
/// `flush` writes at most once over the guard's lifetime; dropping an
/// unflushed guard flushes it.
pub struct ExportGuard {
    exporter: MetricsExporter,
    flushed: AtomicBool,
}

impl ExportGuard {
    pub fn new(exporter: MetricsExporter) -> Self {
        Self {
            exporter,
            flushed: AtomicBool::new(false),
        }
    }

    /// Export now unless already done. Returns `None` on repeat calls.
    pub fn flush(&self) -> Option<Result<PathBuf, ExportError>> {
        if self.flushed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(self.exporter.export())
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.flush() {
            tracing::error!(error = %e, "Shutdown metrics export failed");
        }
    }
}
