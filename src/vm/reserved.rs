/*!
 * Reserved Address Space
 * In-process VM backing with page-grained commit and address recycling
 */

use super::{Chunk, VmBacking, VmError, VmResult};
use crate::core::free_list::{FreeBlock, SegregatedFreeList};
use crate::core::limits::{align_up, MAX_VM_SIZE, PAGE_SIZE, VM_BASE_ADDRESS};
use crate::core::types::{Address, Size};
use tracing::{debug, trace};

/// Decommits between free-list coalescing passes
const COALESCE_INTERVAL: u64 = 64;

/// Simulated VM reservation
///
/// Reserves `size` bytes of address space at construction and commits
/// page-aligned chunks out of it. Decommitted ranges are recycled through a
/// segregated free list; fresh address space is bump-allocated. Commits fail
/// once the committed total would exceed the reservation, which is the
/// "physical exhaustion" the arena reports as out-of-memory.
#[derive(Debug)]
pub struct ReservedSpace {
    base: Address,
    reserved: Size,
    committed: Size,
    next: Address,
    free_list: SegregatedFreeList,
    decommits: u64,
}

impl ReservedSpace {
    /// Reserve `size_hint` bytes (rounded up to the page size)
    pub fn new(size_hint: Size) -> VmResult<Self> {
        if size_hint == 0 || size_hint > MAX_VM_SIZE {
            return Err(VmError::InvalidReservation {
                requested: size_hint,
                max: MAX_VM_SIZE,
            });
        }
        let reserved = align_up(size_hint, PAGE_SIZE);
        debug!(reserved, base = VM_BASE_ADDRESS, "Reserved VM address space");

        Ok(Self {
            base: VM_BASE_ADDRESS,
            reserved,
            committed: 0,
            next: VM_BASE_ADDRESS,
            free_list: SegregatedFreeList::new(),
            decommits: 0,
        })
    }

    fn exhausted(&self, requested: Size) -> VmError {
        VmError::Exhausted {
            requested,
            committed: self.committed,
            reserved: self.reserved,
        }
    }

    fn take_recycled(&mut self, size: Size) -> Option<Address> {
        if self.free_list.is_empty() {
            return None;
        }
        let block = self.free_list.find_best_fit(size)?;
        if block.size > size {
            self.free_list.insert(FreeBlock {
                address: block.address + size,
                size: block.size - size,
            });
        }
        Some(block.address)
    }

    fn take_fresh(&mut self, size: Size) -> Option<Address> {
        let limit = self.base + self.reserved;
        if limit - self.next < size {
            return None;
        }
        let address = self.next;
        self.next += size;
        Some(address)
    }
}

impl VmBacking for ReservedSpace {
    fn commit(&mut self, size: Size) -> VmResult<Chunk> {
        if size == 0 || size % PAGE_SIZE != 0 {
            return Err(VmError::BadCommitSize(size));
        }
        if size > self.reserved - self.committed {
            return Err(self.exhausted(size));
        }

        let address = match self.take_recycled(size).or_else(|| self.take_fresh(size)) {
            Some(address) => address,
            None => {
                // Enough bytes are free but scattered; merge and retry once
                self.free_list.coalesce();
                self.take_recycled(size).ok_or_else(|| self.exhausted(size))?
            }
        };

        self.committed += size;
        trace!(address, size, committed = self.committed, "VM commit");
        Ok(Chunk::new(address, size))
    }

    fn decommit(&mut self, chunk: Chunk) {
        debug_assert!(chunk.base >= self.base && chunk.end() <= self.base + self.reserved);
        self.committed = self.committed.saturating_sub(chunk.size);
        self.free_list.insert(FreeBlock {
            address: chunk.base,
            size: chunk.size,
        });

        self.decommits += 1;
        if self.decommits % COALESCE_INTERVAL == 0 {
            self.free_list.coalesce();
        }
        trace!(
            address = chunk.base,
            size = chunk.size,
            committed = self.committed,
            "VM decommit"
        );
    }

    fn reserved(&self) -> Size {
        self.reserved
    }

    fn committed(&self) -> Size {
        self.committed
    }
}
