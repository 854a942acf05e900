/*!
 * Core Module
 * Fundamental arena types, limits and data structures
 */

pub(crate) mod free_list;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use limits::{align_down, align_up, bytes_to_mb, mb_to_bytes};
pub use types::*;
