/*!
 * Core Types
 * Common types and handles used across the arena
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address type for arena memory
pub type Address = usize;

/// Size type for arena memory
pub type Size = usize;

/// Arena identifier, unique per process
pub type ArenaId = u64;

/// Pool identifier, unique per arena
pub type PoolId = u32;

/// Registered thread identifier, unique per arena
pub type ThreadId = u32;

/// Root identifier, unique per arena
pub type RootId = u32;

/// Opaque reference to a pool owned by an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolRef {
    pub(crate) arena: ArenaId,
    pub(crate) id: PoolId,
}

/// Opaque reference to a thread registered with an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub(crate) arena: ArenaId,
    pub(crate) id: ThreadId,
}

/// Opaque reference to a root registered with an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootRef {
    pub(crate) arena: ArenaId,
    pub(crate) id: RootId,
}

macro_rules! impl_handle {
    ($handle:ident, $id:ty, $label:literal) => {
        impl $handle {
            /// Identifier of the owning arena
            #[inline]
            pub fn arena_id(&self) -> ArenaId {
                self.arena
            }

            /// Identifier within the owning arena
            #[inline]
            pub fn id(&self) -> $id {
                self.id
            }
        }

        impl fmt::Display for $handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "{}:{}"), self.arena, self.id)
            }
        }
    };
}

impl_handle!(PoolRef, PoolId, "pool#");
impl_handle!(ThreadRef, ThreadId, "thread#");
impl_handle!(RootRef, RootId, "root#");
