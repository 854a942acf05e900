/*!
 * Segment Buffer
 * Bump allocation within a pool's current segment
 */

use crate::core::free_list::FreeBlock;
use crate::core::types::{Address, Size};
use crate::vm::Chunk;

#[derive(Debug, Clone, Copy)]
pub(super) struct BumpBuffer {
    cursor: Address,
    limit: Address,
}

impl BumpBuffer {
    pub fn new(chunk: Chunk) -> Self {
        Self {
            cursor: chunk.base,
            limit: chunk.end(),
        }
    }

    #[inline]
    pub fn bump(&mut self, size: Size) -> Option<Address> {
        if self.limit - self.cursor < size {
            return None;
        }
        let address = self.cursor;
        self.cursor += size;
        Some(address)
    }

    /// Unused tail of the buffer
    pub fn remaining(&self) -> FreeBlock {
        FreeBlock {
            address: self.cursor,
            size: self.limit - self.cursor,
        }
    }
}
