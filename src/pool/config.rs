/*!
 * Pool Configuration
 */

use crate::core::limits::{align_up, DEFAULT_SEGMENT_SIZE, PAGE_SIZE};
use crate::core::types::Size;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pool class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolClass {
    /// Generational collected pool
    Generational,
    /// Manually managed variable-size pool
    ManualVariable,
}

impl fmt::Display for PoolClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PoolClass::Generational => write!(f, "generational"),
            PoolClass::ManualVariable => write!(f, "manual-variable"),
        }
    }
}

/// Pool creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub class: PoolClass,
    /// Segment size requested from the arena when the buffer runs dry
    pub extend_by: Size,
    /// Expected object size (manual pools)
    pub mean_size: Option<Size>,
    /// Largest object the pool accepts (manual pools)
    pub max_size: Option<Size>,
}

impl PoolConfig {
    /// Generational pool with default 64KB segments
    pub fn generational() -> Self {
        Self {
            class: PoolClass::Generational,
            extend_by: DEFAULT_SEGMENT_SIZE,
            mean_size: None,
            max_size: None,
        }
    }

    /// Manual variable-size pool
    ///
    /// `extend_by` is rounded up to the page size.
    pub fn manual(extend_by: Size, mean_size: Size, max_size: Size) -> Self {
        Self {
            class: PoolClass::ManualVariable,
            extend_by: align_up(extend_by.max(1), PAGE_SIZE),
            mean_size: Some(mean_size),
            max_size: Some(max_size),
        }
    }

    /// Override the segment size (rounded up to the page size)
    #[must_use]
    pub fn with_extend_by(mut self, extend_by: Size) -> Self {
        self.extend_by = align_up(extend_by.max(1), PAGE_SIZE);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::generational()
    }
}
