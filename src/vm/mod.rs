/*!
 * VM Backing
 *
 * The arena's view of the virtual-memory layer: a reservation of address
 * space from which page-grained chunks are committed and decommitted.
 *
 * The arena never maps pages itself. It talks to a [`VmBacking`], which may
 * be the in-process [`ReservedSpace`] simulator or any other implementation
 * (an mmap-backed reservation, a test double).
 */

mod reserved;

pub use reserved::ReservedSpace;

use crate::core::types::{Address, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// VM operation result
pub type VmResult<T> = Result<T, VmError>;

/// VM backing errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum VmError {
    #[error("Invalid reservation: requested {requested} bytes, maximum {max} bytes")]
    #[diagnostic(
        code(vm::invalid_reservation),
        help("Reserve a non-zero size no larger than the maximum VM size.")
    )]
    InvalidReservation { requested: Size, max: Size },

    #[error("VM exhausted: requested {requested} bytes, {committed} of {reserved} bytes committed")]
    #[diagnostic(
        code(vm::exhausted),
        help("The reservation has no room left. Create the arena with a larger size hint.")
    )]
    Exhausted {
        requested: Size,
        committed: Size,
        reserved: Size,
    },

    #[error("Commit of {0} bytes is not a positive multiple of the page size")]
    #[diagnostic(code(vm::bad_commit_size))]
    BadCommitSize(Size),
}

/// Committed range of address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub base: Address,
    pub size: Size,
}

impl Chunk {
    pub fn new(base: Address, size: Size) -> Self {
        Self { base, size }
    }

    /// One past the last address of the chunk
    #[inline]
    pub fn end(&self) -> Address {
        self.base + self.size
    }

    /// Split into `[base, base + at)` and `[base + at, end)`
    #[inline]
    pub fn split_at(self, at: Size) -> (Chunk, Chunk) {
        debug_assert!(at <= self.size);
        (
            Chunk::new(self.base, at),
            Chunk::new(self.base + at, self.size - at),
        )
    }
}

/// Virtual memory backing consumed by the arena
///
/// Commit sizes are always positive multiples of [`PAGE_SIZE`](crate::core::limits::PAGE_SIZE).
/// Implementations must be bounded-latency: the arena calls them while
/// holding its exclusion lock.
#[cfg_attr(test, automock)]
pub trait VmBacking: Send {
    /// Commit `size` bytes, returning the committed range
    fn commit(&mut self, size: Size) -> VmResult<Chunk>;

    /// Return a previously committed range to the backing
    fn decommit(&mut self, chunk: Chunk);

    /// Total address space reserved
    fn reserved(&self) -> Size;

    /// Bytes currently committed through this backing
    fn committed(&self) -> Size;
}
