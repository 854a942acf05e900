/*!
 * Commit Governor
 *
 * Admission control for committed memory. Every byte the arena commits from
 * its VM backing, whether for pools, the reservoir or the arena's own control
 * block, passes through here, so `committed` is the arena-wide total.
 *
 * Admission is a check-then-act pair (`committed + amount <= limit`, then
 * commit); callers hold the arena lock across the whole call.
 */

use super::types::{ArenaError, ArenaResult};
use crate::core::types::Size;
use crate::vm::{Chunk, VmBacking};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub(crate) struct CommitGovernor {
    committed: Size,
    limit: Size,
}

impl CommitGovernor {
    /// Governor with an unbounded commit limit
    pub fn new() -> Self {
        Self {
            committed: 0,
            limit: Size::MAX,
        }
    }

    #[inline]
    pub fn committed(&self) -> Size {
        self.committed
    }

    #[inline]
    pub fn limit(&self) -> Size {
        self.limit
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.limit == Size::MAX
    }

    /// Bytes that may still be committed before reaching the limit
    #[inline]
    pub fn headroom(&self) -> Size {
        self.limit.saturating_sub(self.committed)
    }

    /// Bytes committed beyond the limit (after the limit was lowered)
    #[inline]
    pub fn overshoot(&self) -> Size {
        self.committed.saturating_sub(self.limit)
    }

    /// Set the ceiling. Lowering it below the committed total is legal: it
    /// blocks further growth but never decommits anything by itself.
    pub fn set_limit(&mut self, limit: Size) {
        let previous = self.limit;
        self.limit = limit;
        if limit < self.committed {
            warn!(
                limit,
                committed = self.committed,
                "Commit limit set below committed memory; further growth blocked"
            );
        } else {
            info!(previous, limit, committed = self.committed, "Commit limit changed");
        }
    }

    /// Check whether `amount` more bytes would stay within the limit
    ///
    /// A request no address space could hold is `OutOfMemory` when no limit
    /// applies, since the limit played no part in refusing it.
    pub fn admit(&self, amount: Size) -> ArenaResult<()> {
        match self.committed.checked_add(amount) {
            Some(total) if total <= self.limit => Ok(()),
            None if self.is_unbounded() => Err(ArenaError::OutOfMemory {
                requested: amount,
                reservoir_available: 0,
            }),
            _ => Err(ArenaError::CommitLimitExceeded {
                requested: amount,
                committed: self.committed,
                limit: self.limit,
            }),
        }
    }

    /// Admit and commit `amount` bytes from the VM backing
    ///
    /// Refusal by the limit is `CommitLimitExceeded` and changes nothing;
    /// refusal by the backing is `OutOfMemory`.
    pub fn commit(&mut self, vm: &mut dyn VmBacking, amount: Size) -> ArenaResult<Chunk> {
        self.admit(amount)?;

        let chunk = vm.commit(amount).map_err(|e| {
            debug!(requested = amount, error = %e, "VM refused commit");
            ArenaError::OutOfMemory {
                requested: amount,
                reservoir_available: 0,
            }
        })?;

        self.committed += chunk.size;
        debug!(
            base = chunk.base,
            size = chunk.size,
            committed = self.committed,
            limit = self.limit,
            "Committed chunk"
        );
        Ok(chunk)
    }

    /// Account for a chunk committed while no limit applied (arena control block)
    pub fn adopt(&mut self, chunk: &Chunk) {
        self.committed += chunk.size;
    }

    /// Return a chunk to the VM backing
    pub fn decommit(&mut self, vm: &mut dyn VmBacking, chunk: Chunk) {
        vm.decommit(chunk);
        self.committed = self.committed.saturating_sub(chunk.size);
        debug!(
            base = chunk.base,
            size = chunk.size,
            committed = self.committed,
            "Decommitted chunk"
        );
    }
}

impl Default for CommitGovernor {
    fn default() -> Self {
        Self::new()
    }
}
