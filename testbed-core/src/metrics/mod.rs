//! In-process performance metrics engine.
//!
//! The [`EventRecorder`] ingests request, query and cache events from every
//! concurrent handler. [`compute_stats`] derives a rounded [`StatsSnapshot`]
//! from a point-in-time copy of the recorder without mutating it.

pub mod recorder;
pub mod stats;

pub use recorder::{
    fingerprint, now_ms, EventRecorder, QuerySample, RecorderSnapshot, RequestSample,
    MAX_FINGERPRINT_CHARS,
};
pub use stats::{compute_stats, nearest_rank_percentile, round2, StatsSnapshot};
