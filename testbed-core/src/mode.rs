//! Mode Selector
//!
//! The process runs in one of two blanket modes. Each of the three
//! capabilities (cache, batched reads, batched writes) defaults from the
//! blanket mode and can be overridden individually:
//!
//! - `TESTBED_MODE`: `baseline` (alias `naive`) or `optimized` (alias `gemini`)
//! - `TESTBED_CACHE_ENABLED`
//! - `TESTBED_BATCH_READ_ENABLED`
//! - `TESTBED_BATCH_WRITE_ENABLED`
//!
//! An override always beats the blanket default. The resulting `ModeConfig`
//! is resolved once and never changes for the lifetime of the process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MODE_VAR: &str = "TESTBED_MODE";
pub const CACHE_VAR: &str = "TESTBED_CACHE_ENABLED";
pub const BATCH_READ_VAR: &str = "TESTBED_BATCH_READ_ENABLED";
pub const BATCH_WRITE_VAR: &str = "TESTBED_BATCH_WRITE_ENABLED";

/// Blanket behavioral mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Intentionally inefficient: no cache, N+1 reads, per-row writes.
    #[default]
    Baseline,
    /// Tuned: cache, batched reads, transactional batch writes.
    Optimized,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Optimized => "optimized",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "naive" => Ok(Mode::Baseline),
            "optimized" | "gemini" => Ok(Mode::Optimized),
            _ => Err(ConfigError::InvalidValue {
                field: MODE_VAR.to_string(),
                value: s.to_string(),
                reason: "expected baseline or optimized".to_string(),
            }),
        }
    }
}

/// The three independently switchable capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub cache: bool,
    pub batch_read: bool,
    pub batch_write: bool,
}

/// Process-wide mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub mode: Mode,
    pub cache_enabled: bool,
    pub batch_read_enabled: bool,
    pub batch_write_enabled: bool,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}

impl ModeConfig {
    /// Blanket defaults for a mode, with no overrides applied.
    pub fn for_mode(mode: Mode) -> Self {
        let on = mode == Mode::Optimized;
        Self {
            mode,
            cache_enabled: on,
            batch_read_enabled: on,
            batch_write_enabled: on,
        }
    }

    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match get(MODE_VAR) {
            Some(value) => value.parse()?,
            None => Mode::default(),
        };

        let mut config = Self::for_mode(mode);
        if let Some(value) = get(CACHE_VAR) {
            config.cache_enabled = parse_flag(CACHE_VAR, &value)?;
        }
        if let Some(value) = get(BATCH_READ_VAR) {
            config.batch_read_enabled = parse_flag(BATCH_READ_VAR, &value)?;
        }
        if let Some(value) = get(BATCH_WRITE_VAR) {
            config.batch_write_enabled = parse_flag(BATCH_WRITE_VAR, &value)?;
        }
        Ok(config)
    }

    /// Name of the active mode, used for health reporting and export paths.
    pub fn name(&self) -> &'static str {
        self.mode.as_str()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            cache: self.cache_enabled,
            batch_read: self.batch_read_enabled,
            batch_write: self.batch_write_enabled,
        }
    }

    /// True when an override moved any capability away from the blanket default.
    pub fn has_overrides(&self) -> bool {
        *self != Self::for_mode(self.mode)
    }
}

fn parse_flag(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
