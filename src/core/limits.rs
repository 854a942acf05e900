/*!
 * Arena Limits and Constants
 *
 * Centralized location for sizes, grains and thresholds used by the arena.
 *
 * - Values are grouped by domain (VM, pools, pressure)
 * - Performance-sensitive constants are marked with [PERF]
 */

use super::types::{Address, Size};

// =============================================================================
// VM LIMITS
// =============================================================================

/// Commit grain of the VM backing (4KB)
/// Every commit, decommit and reservoir adjustment is a multiple of this
pub const PAGE_SIZE: Size = 4 * 1024;

/// Default address space reserved for an arena (64MB)
pub const DEFAULT_VM_SIZE: Size = 64 * 1024 * 1024;

/// Largest address space an arena may reserve (1TB)
pub const MAX_VM_SIZE: Size = 1 << 40;

/// Base address of simulated reservations
/// Keeps address zero out of every valid region
pub const VM_BASE_ADDRESS: Address = 0x1000_0000;

/// Arena control block committed at creation (64KB)
/// Holds arena tables; counts toward committed memory for the arena's lifetime
pub const ARENA_CONTROL_SIZE: Size = 64 * 1024;

// =============================================================================
// POOL LIMITS
// =============================================================================

/// Object alignment inside pool segments
pub const ARENA_ALIGNMENT: Size = 8;

/// Default segment size requested by pools (64KB)
/// [PERF] Amortizes governor admission across many small objects
pub const DEFAULT_SEGMENT_SIZE: Size = 64 * 1024;

/// Small block threshold for segregated free lists (4KB)
pub const SMALL_BLOCK_MAX: Size = 4 * 1024;

/// Medium block threshold for segregated free lists (64KB)
pub const MEDIUM_BLOCK_MAX: Size = 64 * 1024;

// =============================================================================
// MEMORY PRESSURE
// =============================================================================

/// Fraction of the commit limit at which pressure is reported as medium
pub const PRESSURE_MEDIUM: f64 = 0.60;

/// Fraction of the commit limit at which pressure is reported as high
pub const PRESSURE_HIGH: f64 = 0.80;

/// Fraction of the commit limit at which pressure is reported as critical
pub const PRESSURE_CRITICAL: f64 = 0.95;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Round `size` up to a multiple of `align` (power of two), saturating at the
/// largest aligned value
#[inline]
pub const fn align_up(size: Size, align: Size) -> Size {
    match size.checked_add(align - 1) {
        Some(v) => v & !(align - 1),
        None => Size::MAX & !(align - 1),
    }
}

/// Round `size` down to a multiple of `align` (power of two)
#[inline]
pub const fn align_down(size: Size, align: Size) -> Size {
    size & !(align - 1)
}

/// Convert bytes to megabytes for human-readable output
#[inline]
pub const fn bytes_to_mb(bytes: usize) -> usize {
    bytes / (1024 * 1024)
}

/// Convert megabytes to bytes
#[inline]
pub const fn mb_to_bytes(mb: usize) -> usize {
    mb * 1024 * 1024
}
