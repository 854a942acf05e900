/*!
 * Reservoir Arena Library
 * Commit-limited arenas with an emergency reservoir
 */

pub mod arena;
pub mod core;
pub mod monitoring;
pub mod pool;
pub mod vm;

// Re-exports
pub use arena::{
    parse_size, Arena, ArenaConfig, ArenaError, ArenaResult, ArenaState, ArenaStats,
    ArenaTeardown, ConfigError, ErrorClass, MemoryPressure, Region, RootRank,
};
pub use crate::core::types::{Address, ArenaId, PoolRef, RootRef, Size, ThreadRef};
pub use monitoring::{init_tracing, OperationSpan};
pub use pool::{PoolClass, PoolConfig, PoolInfo};
pub use vm::{Chunk, ReservedSpace, VmBacking, VmError, VmResult};
