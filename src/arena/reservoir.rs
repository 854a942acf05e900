/*!
 * Reservoir
 *
 * Pre-committed memory held back from ordinary allocation and drawn only by
 * the emergency path.
 *
 * ## Funding policy
 *
 * `limit` is the target size; `available` is what is actually held. The gap
 * (`deficit`) is a normal state under a tight commit limit, reported by query
 * rather than raised as an error.
 *
 * A rebalance runs in a fixed order:
 * 1. shrink toward the commit limit (release `min(available, overshoot)`)
 * 2. shrink to the reservoir limit
 * 3. grow within the governor's headroom, halving the request each time the
 *    VM refuses, down to one page
 *
 * Growth is an ordinary governed commit, so the reservoir can never push the
 * committed total past the commit limit. Shrinking only ever releases the
 * reservoir's own extents; pool memory is untouched.
 */

use super::governor::CommitGovernor;
use crate::core::limits::{align_down, align_up, PAGE_SIZE};
use crate::core::types::{Address, Size};
use crate::vm::{Chunk, VmBacking};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Outcome of a rebalance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Rebalance {
    pub released: Size,
    pub grown: Size,
}

#[derive(Debug, Default)]
pub(crate) struct Reservoir {
    limit: Size,
    /// Free extents keyed by base address, coalesced on deposit
    extents: BTreeMap<Address, Size>,
    available: Size,
}

impl Reservoir {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn limit(&self) -> Size {
        self.limit
    }

    #[inline]
    pub fn available(&self) -> Size {
        self.available
    }

    #[inline]
    pub fn deficit(&self) -> Size {
        self.limit.saturating_sub(self.available)
    }

    /// Largest contiguous extent held
    pub fn largest_extent(&self) -> Size {
        self.extents.values().copied().max().unwrap_or(0)
    }

    /// Record a new target, rounded up to the page size; returns the old one
    pub fn set_limit(&mut self, target: Size) -> Size {
        std::mem::replace(&mut self.limit, align_up(target, PAGE_SIZE))
    }

    /// Take ownership of committed memory
    pub fn deposit(&mut self, chunk: Chunk) {
        if chunk.size == 0 {
            return;
        }
        let mut base = chunk.base;
        let mut size = chunk.size;

        if let Some((&prev_base, &prev_size)) = self.extents.range(..base).next_back() {
            if prev_base + prev_size == base {
                self.extents.remove(&prev_base);
                base = prev_base;
                size += prev_size;
            }
        }
        if let Some(next_size) = self.extents.remove(&chunk.end()) {
            size += next_size;
        }

        self.extents.insert(base, size);
        self.available += chunk.size;
    }

    /// Hand out `size` contiguous bytes from the smallest extent that fits
    pub fn draw(&mut self, size: Size) -> Option<Chunk> {
        let (&base, &extent) = self
            .extents
            .iter()
            .filter(|(_, len)| **len >= size)
            .min_by_key(|(_, len)| **len)?;

        self.extents.remove(&base);
        if extent > size {
            self.extents.insert(base + size, extent - size);
        }
        self.available -= size;
        Some(Chunk::new(base, size))
    }

    /// Decommit up to `amount` bytes (rounded up to pages), highest addresses first
    pub fn release(
        &mut self,
        amount: Size,
        governor: &mut CommitGovernor,
        vm: &mut dyn VmBacking,
    ) -> Size {
        let mut remaining = align_up(amount, PAGE_SIZE).min(self.available);
        let mut released = 0;

        while remaining > 0 {
            let Some((&base, &size)) = self.extents.iter().next_back() else {
                break;
            };
            self.extents.remove(&base);

            let chunk = Chunk::new(base, size);
            let give = if size > remaining {
                let (keep, give) = chunk.split_at(size - remaining);
                self.extents.insert(keep.base, keep.size);
                give
            } else {
                chunk
            };

            self.available -= give.size;
            remaining -= give.size;
            released += give.size;
            governor.decommit(vm, give);
        }
        released
    }

    /// Steps 1 and 2 of the funding policy
    pub fn shrink(&mut self, governor: &mut CommitGovernor, vm: &mut dyn VmBacking) -> Size {
        let mut released = 0;

        let overshoot = governor.overshoot();
        if overshoot > 0 && self.available > 0 {
            released += self.release(overshoot, governor, vm);
        }

        if self.available > self.limit {
            released += self.release(self.available - self.limit, governor, vm);
        }

        if released > 0 {
            debug!(
                released,
                available = self.available,
                limit = self.limit,
                "Reservoir shrunk"
            );
        }
        released
    }

    /// Step 3 of the funding policy
    pub fn grow(&mut self, governor: &mut CommitGovernor, vm: &mut dyn VmBacking) -> Size {
        let mut grown = 0;
        let mut attempt = self.deficit().min(align_down(governor.headroom(), PAGE_SIZE));

        while attempt >= PAGE_SIZE {
            match governor.commit(vm, attempt) {
                Ok(chunk) => {
                    grown += chunk.size;
                    self.deposit(chunk);
                    attempt = attempt
                        .min(self.deficit())
                        .min(align_down(governor.headroom(), PAGE_SIZE));
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Reservoir growth refused, halving");
                    attempt = align_down(attempt / 2, PAGE_SIZE);
                }
            }
        }

        if grown > 0 {
            debug!(
                grown,
                available = self.available,
                limit = self.limit,
                "Reservoir grown"
            );
        }
        if self.deficit() > 0 {
            warn!(
                limit = self.limit,
                available = self.available,
                deficit = self.deficit(),
                headroom = governor.headroom(),
                "Reservoir underfunded"
            );
        }
        grown
    }

    /// Full re-evaluation: shrink, then grow
    pub fn rebalance(&mut self, governor: &mut CommitGovernor, vm: &mut dyn VmBacking) -> Rebalance {
        let released = self.shrink(governor, vm);
        let grown = self.grow(governor, vm);
        Rebalance { released, grown }
    }

    /// Release everything back to the VM backing
    pub fn drain(&mut self, governor: &mut CommitGovernor, vm: &mut dyn VmBacking) -> Size {
        let mut released = 0;
        for (base, size) in std::mem::take(&mut self.extents) {
            governor.decommit(vm, Chunk::new(base, size));
            released += size;
        }
        self.available = 0;
        released
    }
}
