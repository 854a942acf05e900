/*!
 * Arena Configuration
 * Creation parameters, loadable from the environment
 */

use crate::core::limits::DEFAULT_VM_SIZE;
use crate::core::types::Size;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

pub const ENV_VM_SIZE: &str = "ARENA_VM_SIZE";
pub const ENV_COMMIT_LIMIT: &str = "ARENA_COMMIT_LIMIT";
pub const ENV_RESERVOIR_LIMIT: &str = "ARENA_RESERVOIR_LIMIT";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {variable}: {value:?}")]
    #[diagnostic(
        code(config::invalid_size),
        help("Use a byte count with an optional K, KiB, M, MiB, G or GiB suffix, e.g. `64MiB`.")
    )]
    InvalidSize { variable: String, value: String },

    #[error("Value for {variable} overflows: {value:?}")]
    #[diagnostic(code(config::overflow))]
    Overflow { variable: String, value: String },
}

/// Arena creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Address space to reserve
    pub vm_size: Size,
    /// Commit ceiling; `None` is unbounded
    pub commit_limit: Option<Size>,
    /// Reservoir target
    pub reservoir_limit: Size,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            vm_size: DEFAULT_VM_SIZE,
            commit_limit: None,
            reservoir_limit: 0,
        }
    }
}

impl ArenaConfig {
    pub fn new(vm_size: Size) -> Self {
        Self {
            vm_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_commit_limit(mut self, limit: Size) -> Self {
        self.commit_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_reservoir_limit(mut self, limit: Size) -> Self {
        self.reservoir_limit = limit;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ARENA_VM_SIZE`: reservation size (default: 64MiB)
    /// - `ARENA_COMMIT_LIMIT`: commit ceiling, or `unbounded` (default: unbounded)
    /// - `ARENA_RESERVOIR_LIMIT`: reservoir target (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = read_var(ENV_VM_SIZE) {
            config.vm_size = parse_size(ENV_VM_SIZE, &value)?;
        }
        if let Some(value) = read_var(ENV_COMMIT_LIMIT) {
            config.commit_limit = match value.to_ascii_lowercase().as_str() {
                "unbounded" | "none" => None,
                _ => Some(parse_size(ENV_COMMIT_LIMIT, &value)?),
            };
        }
        if let Some(value) = read_var(ENV_RESERVOIR_LIMIT) {
            config.reservoir_limit = parse_size(ENV_RESERVOIR_LIMIT, &value)?;
        }

        Ok(config)
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a byte count such as `4096`, `512K`, `64MiB` or `1g`
pub fn parse_size(variable: &str, value: &str) -> Result<Size, ConfigError> {
    let invalid = || ConfigError::InvalidSize {
        variable: variable.to_string(),
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let multiplier: Size = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        _ => return Err(invalid()),
    };

    let overflow = || ConfigError::Overflow {
        variable: variable.to_string(),
        value: value.to_string(),
    };
    let base: Size = digits.parse().map_err(|_| overflow())?;
    base.checked_mul(multiplier).ok_or_else(overflow)
}
