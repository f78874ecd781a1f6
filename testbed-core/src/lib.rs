//! Testbed Core - Shared Types and Metrics Engine
//!
//! Everything the storage and API layers agree on lives here:
//! - Shop entities (products, users, orders) and order pricing
//! - The error taxonomy shared by stores and services
//! - The Mode Selector (`ModeConfig`) resolved once at startup
//! - The Event Recorder and Stats Aggregator
//!
//! This crate performs no I/O.

pub mod entities;
pub mod error;
pub mod health;
pub mod metrics;
pub mod mode;

pub use entities::*;
pub use error::{
    CacheError, ConfigError, StorageError, StorageResult, TestbedError, TestbedResult,
    ValidationError,
};
pub use health::{HealthCheck, HealthStatus};
pub use metrics::{
    compute_stats, fingerprint, nearest_rank_percentile, now_ms, round2, EventRecorder,
    QuerySample, RecorderSnapshot, RequestSample, StatsSnapshot, MAX_FINGERPRINT_CHARS,
};
pub use mode::{Capabilities, Mode, ModeConfig};
