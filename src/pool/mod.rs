/*!
 * Pools
 *
 * Clients of the arena that turn committed segments into objects.
 *
 * A pool never commits memory itself: when its allocation buffer runs dry it
 * asks the arena for a segment through one of the two allocation paths, then
 * carves objects out of it.
 *
 * ## Classes
 *
 * - **Generational**: collected pool. Objects are only reclaimed by the
 *   external collector or by destroying the pool; `free` is rejected.
 * - **Manual variable**: manually managed pool. Freed blocks go to a
 *   segregated free list and are reused best-fit before the buffer is bumped.
 */

mod config;
mod segment;

pub use config::{PoolClass, PoolConfig};

use crate::arena::{ArenaError, ArenaResult};
use crate::core::free_list::{FreeBlock, SegregatedFreeList};
use crate::core::limits::{align_up, ARENA_ALIGNMENT, PAGE_SIZE};
use crate::core::types::{Address, PoolId, Size};
use crate::vm::Chunk;
use ahash::HashMap;
use segment::BumpBuffer;
use serde::{Deserialize, Serialize};

/// Snapshot of a pool's memory use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub class: PoolClass,
    pub segments: usize,
    pub committed_bytes: Size,
    pub allocated_bytes: Size,
    /// Expected object size the pool was created for (manual pools)
    pub mean_size: Option<Size>,
    /// Bytes awaiting reuse on the free list (manual pools)
    pub free_bytes: Size,
    pub object_count: usize,
}

/// Pool state owned by an arena
#[derive(Debug)]
pub(crate) struct Pool {
    id: PoolId,
    config: PoolConfig,
    segments: Vec<Chunk>,
    buffer: Option<BumpBuffer>,
    free_list: SegregatedFreeList,
    live: HashMap<Address, Size>,
    allocated_bytes: Size,
    object_count: usize,
}

impl Pool {
    /// `extend_by` is rounded up to whole pages however the config was built
    pub fn new(id: PoolId, mut config: PoolConfig) -> Self {
        config.extend_by = align_up(config.extend_by.max(1), PAGE_SIZE);
        Self {
            id,
            config,
            segments: Vec::new(),
            buffer: None,
            free_list: SegregatedFreeList::new(),
            live: HashMap::default(),
            allocated_bytes: 0,
            object_count: 0,
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn class(&self) -> PoolClass {
        self.config.class
    }

    /// Validate a request and return its aligned object size
    pub fn object_size(&self, size: Size) -> ArenaResult<Size> {
        if size == 0 {
            return Err(ArenaError::InvalidSize {
                size,
                reason: "allocation size must be non-zero",
            });
        }
        if let Some(max) = self.config.max_size {
            if size > max {
                return Err(ArenaError::InvalidSize {
                    size,
                    reason: "allocation exceeds the pool's maximum block size",
                });
            }
        }
        if size > Size::MAX - PAGE_SIZE {
            return Err(ArenaError::InvalidSize {
                size,
                reason: "allocation exceeds the address space",
            });
        }
        Ok(align_up(size, ARENA_ALIGNMENT))
    }

    /// Serve an object from recycled blocks or the current buffer
    pub fn try_carve(&mut self, size: Size) -> Option<Address> {
        let address = self.take_free(size).or_else(|| {
            self.buffer.as_mut().and_then(|buffer| buffer.bump(size))
        })?;
        self.record_live(address, size);
        Some(address)
    }

    fn take_free(&mut self, size: Size) -> Option<Address> {
        if self.config.class != PoolClass::ManualVariable {
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

    fn record_live(&mut self, address: Address, size: Size) {
        self.allocated_bytes += size;
        self.object_count += 1;
        if self.config.class == PoolClass::ManualVariable {
            self.live.insert(address, size);
        }
    }

    /// Segment size to request for an object of `size` bytes
    pub fn segment_request(&self, size: Size) -> Size {
        self.config.extend_by.max(self.minimal_segment(size))
    }

    /// Smallest segment that can hold an object of `size` bytes
    pub fn minimal_segment(&self, size: Size) -> Size {
        align_up(size, PAGE_SIZE)
    }

    /// Adopt a freshly obtained segment as the allocation buffer
    ///
    /// The unused tail of the previous buffer is recycled by manual pools and
    /// abandoned by generational pools until the collector reclaims it.
    pub fn install_segment(&mut self, chunk: Chunk) {
        if let Some(old) = self.buffer.take() {
            let remainder = old.remaining();
            if self.config.class == PoolClass::ManualVariable && remainder.size > 0 {
                self.free_list.insert(remainder);
            }
        }
        self.segments.push(chunk);
        self.buffer = Some(BumpBuffer::new(chunk));
    }

    /// Return a manually allocated block to the pool
    pub fn free(&mut self, address: Address, size: Size) -> ArenaResult<()> {
        if self.config.class != PoolClass::ManualVariable {
            return Err(ArenaError::Unsupported {
                operation: "free",
                class: self.config.class,
            });
        }
        match self.live.get(&address) {
            Some(&live_size) if live_size == align_up(size, ARENA_ALIGNMENT) => {
                self.live.remove(&address);
                self.allocated_bytes -= live_size;
                self.object_count -= 1;
                self.free_list.insert(FreeBlock {
                    address,
                    size: live_size,
                });
                Ok(())
            }
            _ => Err(ArenaError::InvalidRegion { address, size }),
        }
    }

    /// Give up every segment, leaving the pool empty
    pub fn take_segments(&mut self) -> Vec<Chunk> {
        self.buffer = None;
        self.free_list = SegregatedFreeList::new();
        self.live.clear();
        self.allocated_bytes = 0;
        self.object_count = 0;
        std::mem::take(&mut self.segments)
    }

    pub fn committed_bytes(&self) -> Size {
        self.segments.iter().map(|c| c.size).sum()
    }

    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            class: self.config.class,
            segments: self.segments.len(),
            committed_bytes: self.committed_bytes(),
            allocated_bytes: self.allocated_bytes,
            mean_size: self.config.mean_size,
            free_bytes: self.free_list.total_bytes(),
            object_count: self.object_count,
        }
    }
}
