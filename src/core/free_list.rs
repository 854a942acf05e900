/*!
 * Segregated Free List
 * Address recycling for VM reservations and manual pools
 */

use super::limits::{MEDIUM_BLOCK_MAX, SMALL_BLOCK_MAX};
use super::types::{Address, Size};
use std::collections::BTreeMap;

/// Free range available for reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeBlock {
    pub address: Address,
    pub size: Size,
}

impl FreeBlock {
    #[inline]
    pub fn end(&self) -> Address {
        self.address + self.size
    }
}

const SMALL_BUCKETS: usize = 7; // 64, 128, ..., 4096 bytes
const MEDIUM_BUCKETS: usize = 15; // 8KB, 12KB, ..., 64KB

/// Segregated free list
/// - Small blocks (<=4KB): power-of-2 buckets
/// - Medium blocks (4KB-64KB): 4KB increment buckets
/// - Large blocks (>64KB): BTreeMap keyed by size
///
/// Buckets hold ranges of sizes, so lookups check each candidate against the
/// requested size and never hand out an undersized block.
#[derive(Debug)]
pub(crate) struct SegregatedFreeList {
    small_blocks: Vec<Vec<FreeBlock>>,
    medium_blocks: Vec<Vec<FreeBlock>>,
    large_blocks: BTreeMap<Size, Vec<FreeBlock>>,
    total_bytes: Size,
}

impl SegregatedFreeList {
    pub fn new() -> Self {
        Self {
            small_blocks: vec![Vec::new(); SMALL_BUCKETS],
            medium_blocks: vec![Vec::new(); MEDIUM_BUCKETS],
            large_blocks: BTreeMap::new(),
            total_bytes: 0,
        }
    }

    fn small_bucket_index(size: Size) -> Option<usize> {
        if size > SMALL_BLOCK_MAX {
            return None;
        }
        // 2^6 = 64 is bucket 0
        let bucket = if size <= 64 {
            0
        } else {
            (size.next_power_of_two().trailing_zeros() - 6) as usize
        };
        Some(bucket.min(SMALL_BUCKETS - 1))
    }

    fn medium_bucket_index(size: Size) -> Option<usize> {
        if size <= SMALL_BLOCK_MAX || size > MEDIUM_BLOCK_MAX {
            return None;
        }
        let bucket = (size / (4 * 1024)).saturating_sub(1);
        Some(bucket.min(MEDIUM_BUCKETS - 1))
    }

    pub fn insert(&mut self, block: FreeBlock) {
        if block.size == 0 {
            return;
        }
        self.total_bytes += block.size;
        if let Some(idx) = Self::small_bucket_index(block.size) {
            self.small_blocks[idx].push(block);
        } else if let Some(idx) = Self::medium_bucket_index(block.size) {
            self.medium_blocks[idx].push(block);
        } else {
            self.large_blocks.entry(block.size).or_default().push(block);
        }
    }

    fn take_from_buckets(buckets: &mut [Vec<FreeBlock>], start: usize, size: Size) -> Option<FreeBlock> {
        for bucket in buckets.iter_mut().skip(start) {
            let best = bucket
                .iter()
                .enumerate()
                .filter(|(_, b)| b.size >= size)
                .min_by_key(|(_, b)| b.size)
                .map(|(i, _)| i);
            if let Some(i) = best {
                return Some(bucket.swap_remove(i));
            }
        }
        None
    }

    /// Remove and return the smallest block that holds at least `size` bytes
    pub fn find_best_fit(&mut self, size: Size) -> Option<FreeBlock> {
        let found = self.find_in_classes(size);
        if let Some(block) = found {
            self.total_bytes -= block.size;
        }
        found
    }

    fn find_in_classes(&mut self, size: Size) -> Option<FreeBlock> {
        if let Some(start) = Self::small_bucket_index(size) {
            if let Some(block) = Self::take_from_buckets(&mut self.small_blocks, start, size) {
                return Some(block);
            }
        }

        if size <= MEDIUM_BLOCK_MAX {
            let start = Self::medium_bucket_index(size.max(SMALL_BLOCK_MAX + 1)).unwrap_or(0);
            if let Some(block) = Self::take_from_buckets(&mut self.medium_blocks, start, size) {
                return Some(block);
            }
        }

        let block_size = self.large_blocks.range(size..).next().map(|(s, _)| *s)?;
        let blocks = self.large_blocks.get_mut(&block_size)?;
        let block = blocks.pop();
        if blocks.is_empty() {
            self.large_blocks.remove(&block_size);
        }
        block
    }

    pub fn len(&self) -> usize {
        let small: usize = self.small_blocks.iter().map(Vec::len).sum();
        let medium: usize = self.medium_blocks.iter().map(Vec::len).sum();
        let large: usize = self.large_blocks.values().map(Vec::len).sum();
        small + medium + large
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Bytes held across all size classes
    pub fn total_bytes(&self) -> Size {
        self.total_bytes
    }

    fn drain_sorted(&mut self) -> Vec<FreeBlock> {
        let mut all_blocks = Vec::with_capacity(self.len());
        for bucket in &mut self.small_blocks {
            all_blocks.append(bucket);
        }
        for bucket in &mut self.medium_blocks {
            all_blocks.append(bucket);
        }
        for blocks in self.large_blocks.values_mut() {
            all_blocks.append(blocks);
        }
        self.large_blocks.clear();
        self.total_bytes = 0;

        all_blocks.sort_by_key(|b| b.address);
        all_blocks
    }

    /// Merge address-adjacent blocks, returning the number of merges
    pub fn coalesce(&mut self) -> usize {
        if self.len() < 2 {
            return 0;
        }

        let mut merged: Vec<FreeBlock> = Vec::new();
        let mut merges = 0;
        for block in self.drain_sorted() {
            match merged.last_mut() {
                Some(last) if last.end() == block.address => {
                    last.size += block.size;
                    merges += 1;
                }
                _ => merged.push(block),
            }
        }

        for block in merged {
            self.insert(block);
        }
        merges
    }
}

impl Default for SegregatedFreeList {
    fn default() -> Self {
        Self::new()
    }
}
