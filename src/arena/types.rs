/*!
 * Arena Types
 * Errors, regions and statistics for the arena
 */

use crate::core::limits::{PRESSURE_CRITICAL, PRESSURE_HIGH, PRESSURE_MEDIUM};
use crate::core::types::{Address, ArenaId, PoolRef, RootRef, Size, ThreadRef};
use crate::pool::PoolClass;
use crate::vm::VmError;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Arena operation result
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Arena errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ArenaError {
    #[error("Commit limit exceeded: requested {requested} bytes, {committed} of {limit} bytes committed")]
    #[diagnostic(
        code(arena::commit_limit_exceeded),
        help("Retry through the emergency path or reduce memory pressure. The reservoir is intact.")
    )]
    CommitLimitExceeded {
        requested: Size,
        committed: Size,
        limit: Size,
    },

    #[error("Out of memory: requested {requested} bytes, reservoir holds {reservoir_available} bytes")]
    #[diagnostic(
        code(arena::out_of_memory),
        help("Neither the reservoir nor the VM backing can supply the request. Abandon the operation.")
    )]
    OutOfMemory {
        requested: Size,
        reservoir_available: Size,
    },

    #[error("Arena destroyed: `{operation}` called on a destroyed arena")]
    #[diagnostic(
        code(arena::destroyed),
        help("A handle outlived its arena. No operation is valid after destruction.")
    )]
    Destroyed { operation: &'static str },

    #[error("VM backing failure: {0}")]
    #[diagnostic(code(arena::vm))]
    Vm(#[from] VmError),

    #[error("Handle {handle} belongs to arena {owner}, not arena {arena}")]
    #[diagnostic(code(arena::foreign_handle))]
    ForeignHandle {
        handle: String,
        owner: ArenaId,
        arena: ArenaId,
    },

    #[error("Unknown pool {0}")]
    #[diagnostic(code(arena::unknown_pool), help("The pool may already have been destroyed."))]
    UnknownPool(PoolRef),

    #[error("Unknown thread {0}")]
    #[diagnostic(code(arena::unknown_thread), help("The thread may already have been deregistered."))]
    UnknownThread(ThreadRef),

    #[error("Unknown root {0}")]
    #[diagnostic(code(arena::unknown_root), help("The root may already have been destroyed."))]
    UnknownRoot(RootRef),

    #[error("Thread {thread} still has {roots} root(s) attached")]
    #[diagnostic(code(arena::thread_has_roots), help("Destroy the thread's roots before deregistering it."))]
    ThreadHasRoots { thread: ThreadRef, roots: usize },

    #[error("Invalid allocation size {size}: {reason}")]
    #[diagnostic(code(arena::invalid_size))]
    InvalidSize { size: Size, reason: &'static str },

    #[error("No live block of {size} bytes at 0x{address:x}")]
    #[diagnostic(code(arena::invalid_region))]
    InvalidRegion { address: Address, size: Size },

    #[error("Operation `{operation}` is not supported by {class} pools")]
    #[diagnostic(code(arena::unsupported))]
    Unsupported {
        operation: &'static str,
        class: PoolClass,
    },
}

/// Coarse classification of an [`ArenaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected under pressure; retry through the emergency path
    Recoverable,
    /// No memory obtainable; terminal for the current operation
    Terminal,
    /// Caller broke the arena's contract (stale or destroyed handle)
    ContractViolation,
    /// Malformed request
    InvalidRequest,
}

impl ArenaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ArenaError::CommitLimitExceeded { .. } => ErrorClass::Recoverable,
            ArenaError::OutOfMemory { .. } | ArenaError::Vm(_) => ErrorClass::Terminal,
            ArenaError::Destroyed { .. }
            | ArenaError::ForeignHandle { .. }
            | ArenaError::UnknownPool(_)
            | ArenaError::UnknownThread(_)
            | ArenaError::UnknownRoot(_) => ErrorClass::ContractViolation,
            ArenaError::ThreadHasRoots { .. }
            | ArenaError::InvalidSize { .. }
            | ArenaError::InvalidRegion { .. }
            | ArenaError::Unsupported { .. } => ErrorClass::InvalidRequest,
        }
    }

    #[inline]
    pub fn is_commit_limit(&self) -> bool {
        matches!(self, ArenaError::CommitLimitExceeded { .. })
    }

    #[inline]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, ArenaError::OutOfMemory { .. })
    }

    #[inline]
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, ArenaError::Destroyed { .. })
    }
}

/// Memory handed out by an allocation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub pool: PoolRef,
    pub base: Address,
    pub size: Size,
}

impl Region {
    #[inline]
    pub fn end(&self) -> Address {
        self.base + self.size
    }
}

/// Arena lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaState {
    Active,
    Destroyed,
}

/// Commit pressure levels relative to the commit limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryPressure {
    /// Pressure of `committed` against `limit`; an unbounded limit is always low
    pub fn of(committed: Size, limit: Size) -> Self {
        if limit == Size::MAX || (limit == 0 && committed == 0) {
            return MemoryPressure::Low;
        }
        let ratio = if limit == 0 {
            f64::INFINITY
        } else {
            committed as f64 / limit as f64
        };
        if ratio >= PRESSURE_CRITICAL {
            MemoryPressure::Critical
        } else if ratio >= PRESSURE_HIGH {
            MemoryPressure::High
        } else if ratio >= PRESSURE_MEDIUM {
            MemoryPressure::Medium
        } else {
            MemoryPressure::Low
        }
    }
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            MemoryPressure::Low => write!(f, "LOW"),
            MemoryPressure::Medium => write!(f, "MEDIUM"),
            MemoryPressure::High => write!(f, "HIGH"),
            MemoryPressure::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Arena statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaStats {
    pub arena: ArenaId,
    pub state: ArenaState,
    pub committed: Size,
    /// `None` when unbounded
    pub commit_limit: Option<Size>,
    pub reservoir_limit: Size,
    pub reservoir_available: Size,
    pub reservoir_deficit: Size,
    /// Largest segment the emergency path can draw in one piece
    pub reservoir_largest_extent: Size,
    pub vm_reserved: Size,
    pub pools: usize,
    pub threads: usize,
    pub roots: usize,
    pub pressure: MemoryPressure,
}

/// Summary of an arena destruction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaTeardown {
    pub pools_destroyed: usize,
    pub threads_deregistered: usize,
    pub roots_destroyed: usize,
    pub bytes_released: Size,
}
