/*!
 * Arena
 *
 * The governance core of a memory manager: a reserved address space, a
 * commit governor enforcing the commit limit, a reservoir of pre-committed
 * memory for emergencies, and the pools, threads and roots created in it.
 *
 * ## Lifecycle
 * An [`Arena`] is a cheap, cloneable handle. Every operation locks the shared
 * state and first checks that the arena is still active; once `destroy` has
 * run, every entry point (queries included) returns
 * [`ArenaError::Destroyed`] without touching torn-down state.
 *
 * ## Thread safety
 * All state sits behind one `parking_lot::Mutex`, so limit changes, reservoir
 * rebalancing and both allocation paths are serialised per arena and every
 * query observes a consistent snapshot.
 */

pub mod config;
mod governor;
mod registry;
mod reservoir;
mod router;
pub mod types;

pub use config::{parse_size, ArenaConfig, ConfigError};
pub use registry::RootRank;
pub use types::{
    ArenaError, ArenaResult, ArenaState, ArenaStats, ArenaTeardown, ErrorClass, MemoryPressure,
    Region,
};

use crate::core::limits::ARENA_CONTROL_SIZE;
use crate::core::types::{ArenaId, PoolRef, RootRef, Size, ThreadRef};
use crate::monitoring::OperationSpan;
use crate::pool::{Pool, PoolConfig, PoolInfo};
use crate::vm::{Chunk, ReservedSpace, VmBacking, VmResult};
use governor::CommitGovernor;
use parking_lot::{Mutex, MutexGuard};
use registry::{DeregisterRefusal, Registry};
use reservoir::Reservoir;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Shared arena state
pub(crate) struct ArenaInner {
    id: ArenaId,
    state: ArenaState,
    vm: Box<dyn VmBacking>,
    governor: CommitGovernor,
    reservoir: Reservoir,
    registry: Registry,
    control: Option<Chunk>,
    pressure: MemoryPressure,
}

/// Handle to an arena
#[derive(Clone)]
pub struct Arena {
    id: ArenaId,
    inner: Arc<Mutex<ArenaInner>>,
}

impl Arena {
    // =========================================================================
    // Creation
    // =========================================================================

    /// Reserve `vm_size_hint` bytes of address space and create an arena in it
    ///
    /// The new arena has an unbounded commit limit and an empty reservoir.
    pub fn create(vm_size_hint: Size) -> VmResult<Self> {
        Self::with_backing(Box::new(ReservedSpace::new(vm_size_hint)?))
    }

    /// Create an arena and apply the configured limits
    pub fn with_config(config: &ArenaConfig) -> VmResult<Self> {
        let arena = Self::create(config.vm_size)?;
        {
            let mut inner = arena.inner.lock();
            if let Some(limit) = config.commit_limit {
                inner.set_commit_limit(limit);
            }
            inner.set_reservoir_limit(config.reservoir_limit);
        }
        Ok(arena)
    }

    /// Create an arena over an existing VM backing
    pub fn with_backing(mut vm: Box<dyn VmBacking>) -> VmResult<Self> {
        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);

        let control = vm.commit(ARENA_CONTROL_SIZE)?;
        let mut governor = CommitGovernor::new();
        governor.adopt(&control);

        info!(
            arena = id,
            reserved = vm.reserved(),
            committed = governor.committed(),
            "Arena created"
        );

        Ok(Self {
            id,
            inner: Arc::new(Mutex::new(ArenaInner {
                id,
                state: ArenaState::Active,
                vm,
                governor,
                reservoir: Reservoir::new(),
                registry: Registry::new(),
                control: Some(control),
                pressure: MemoryPressure::Low,
            })),
        })
    }

    #[inline]
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Whether `destroy` has run
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().state == ArenaState::Destroyed
    }

    fn lock_active(&self, operation: &'static str) -> ArenaResult<MutexGuard<'_, ArenaInner>> {
        let inner = self.inner.lock();
        if inner.state == ArenaState::Destroyed {
            error!(arena = self.id, operation, "Operation on destroyed arena rejected");
            return Err(ArenaError::Destroyed { operation });
        }
        Ok(inner)
    }

    // =========================================================================
    // Limits
    // =========================================================================

    /// Set the commit ceiling
    ///
    /// Lowering the limit below the committed total is legal: the reservoir
    /// gives back what it can, and further growth is blocked.
    pub fn set_commit_limit(&self, bytes: Size) -> ArenaResult<()> {
        let mut inner = self.lock_active("set_commit_limit")?;
        let _span = OperationSpan::new("set_commit_limit", self.id);
        inner.set_commit_limit(bytes);
        Ok(())
    }

    pub fn commit_limit(&self) -> ArenaResult<Size> {
        Ok(self.lock_active("commit_limit")?.governor.limit())
    }

    /// Set the reservoir target (rounded up to the page size) and rebalance
    pub fn set_reservoir_limit(&self, bytes: Size) -> ArenaResult<()> {
        let mut inner = self.lock_active("set_reservoir_limit")?;
        let _span = OperationSpan::new("set_reservoir_limit", self.id);
        inner.set_reservoir_limit(bytes);
        Ok(())
    }

    pub fn reservoir_limit(&self) -> ArenaResult<Size> {
        Ok(self.lock_active("reservoir_limit")?.reservoir.limit())
    }

    pub fn reservoir_available(&self) -> ArenaResult<Size> {
        Ok(self.lock_active("reservoir_available")?.reservoir.available())
    }

    /// Shortfall of the reservoir against its target
    pub fn reservoir_deficit(&self) -> ArenaResult<Size> {
        Ok(self.lock_active("reservoir_deficit")?.reservoir.deficit())
    }

    /// Total bytes committed by the arena
    pub fn committed_and_used(&self) -> ArenaResult<Size> {
        Ok(self.lock_active("committed_and_used")?.governor.committed())
    }

    /// Rerun the reservoir top-up policy; returns the bytes gained
    pub fn refill_reservoir(&self) -> ArenaResult<Size> {
        let mut inner = self.lock_active("refill_reservoir")?;
        let _span = OperationSpan::new("refill_reservoir", self.id);
        let ArenaInner {
            governor,
            reservoir,
            vm,
            ..
        } = &mut *inner;
        let outcome = reservoir.rebalance(governor, vm.as_mut());
        Ok(outcome.grown)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate through the normal path
    ///
    /// Never touches the reservoir. Under a tight commit limit this fails
    /// with [`ArenaError::CommitLimitExceeded`], after which the caller may
    /// retry through [`Arena::allocate_emergency`].
    pub fn allocate_normal(&self, pool: &PoolRef, size: Size) -> ArenaResult<Region> {
        self.lock_active("allocate_normal")?.allocate_normal(pool, size)
    }

    /// Allocate through the emergency path, drawing on the reservoir
    pub fn allocate_emergency(&self, pool: &PoolRef, size: Size) -> ArenaResult<Region> {
        self.lock_active("allocate_emergency")?
            .allocate_emergency(pool, size)
    }

    /// Return a block to a manual pool
    pub fn free(&self, region: &Region) -> ArenaResult<()> {
        let mut inner = self.lock_active("free")?;
        let arena = inner.id;
        ArenaInner::pool_in(&mut inner.registry, arena, &region.pool)?.free(region.base, region.size)
    }

    // =========================================================================
    // Pools
    // =========================================================================

    pub fn create_pool(&self, config: PoolConfig) -> ArenaResult<PoolRef> {
        let mut inner = self.lock_active("create_pool")?;
        let class = config.class;
        let extend_by = config.extend_by;
        let id = inner.registry.add_pool(config);
        info!(arena = self.id, pool = id, %class, extend_by, "Pool created");
        Ok(PoolRef {
            arena: self.id,
            id,
        })
    }

    /// Destroy a pool, depositing its segments into the reservoir
    ///
    /// Whatever the reservoir holds beyond its limit afterwards is decommitted.
    pub fn destroy_pool(&self, pool: &PoolRef) -> ArenaResult<()> {
        let mut inner = self.lock_active("destroy_pool")?;
        let _span = OperationSpan::new("destroy_pool", self.id);
        inner.check_owner(&pool.to_string(), pool.arena)?;

        let ArenaInner {
            registry,
            reservoir,
            governor,
            vm,
            ..
        } = &mut *inner;
        let mut removed = registry
            .remove_pool(pool.id)
            .ok_or(ArenaError::UnknownPool(*pool))?;

        let segments = removed.take_segments();
        let deposited: Size = segments.iter().map(|c| c.size).sum();
        for segment in segments {
            reservoir.deposit(segment);
        }
        let released = reservoir.shrink(governor, vm.as_mut());

        info!(
            arena = self.id,
            pool = pool.id,
            class = %removed.class(),
            deposited,
            released,
            reservoir_available = reservoir.available(),
            "Pool destroyed"
        );
        Ok(())
    }

    pub fn pool_info(&self, pool: &PoolRef) -> ArenaResult<PoolInfo> {
        let inner = self.lock_active("pool_info")?;
        inner.check_owner(&pool.to_string(), pool.arena)?;
        inner
            .registry
            .pool(pool.id)
            .map(Pool::info)
            .ok_or(ArenaError::UnknownPool(*pool))
    }

    // =========================================================================
    // Threads and roots
    // =========================================================================

    pub fn register_thread(&self) -> ArenaResult<ThreadRef> {
        self.register_named_thread(None)
    }

    pub fn register_named_thread(&self, name: Option<&str>) -> ArenaResult<ThreadRef> {
        let mut inner = self.lock_active("register_thread")?;
        let id = inner.registry.add_thread(name.map(str::to_string));
        debug!(arena = self.id, thread = id, name, "Thread registered");
        Ok(ThreadRef {
            arena: self.id,
            id,
        })
    }

    /// Deregister a thread; it must have no roots attached
    pub fn deregister_thread(&self, thread: &ThreadRef) -> ArenaResult<()> {
        let mut inner = self.lock_active("deregister_thread")?;
        inner.check_owner(&thread.to_string(), thread.arena)?;
        match inner.registry.remove_thread(thread.id) {
            Ok(record) => {
                debug!(
                    arena = self.id,
                    thread = thread.id,
                    name = record.name.as_deref(),
                    "Thread deregistered"
                );
                Ok(())
            }
            Err(DeregisterRefusal::Unknown) => Err(ArenaError::UnknownThread(*thread)),
            Err(DeregisterRefusal::HasRoots(roots)) => Err(ArenaError::ThreadHasRoots {
                thread: *thread,
                roots,
            }),
        }
    }

    /// Register a root, optionally attached to a registered thread
    pub fn create_root(&self, rank: RootRank, thread: Option<&ThreadRef>) -> ArenaResult<RootRef> {
        let mut inner = self.lock_active("create_root")?;
        if let Some(t) = thread {
            inner.check_owner(&t.to_string(), t.arena)?;
        }
        let id = inner
            .registry
            .add_root(rank, thread.map(|t| t.id))
            .map_err(|tid| {
                ArenaError::UnknownThread(ThreadRef {
                    arena: self.id,
                    id: tid,
                })
            })?;
        debug!(arena = self.id, root = id, ?rank, "Root created");
        Ok(RootRef {
            arena: self.id,
            id,
        })
    }

    pub fn destroy_root(&self, root: &RootRef) -> ArenaResult<()> {
        let mut inner = self.lock_active("destroy_root")?;
        inner.check_owner(&root.to_string(), root.arena)?;
        let record = inner
            .registry
            .remove_root(root.id)
            .ok_or(ArenaError::UnknownRoot(*root))?;
        debug!(
            arena = self.id,
            root = root.id,
            rank = ?record.rank,
            thread = record.thread,
            "Root destroyed"
        );
        Ok(())
    }

    // =========================================================================
    // Diagnostics and teardown
    // =========================================================================

    pub fn stats(&self) -> ArenaResult<ArenaStats> {
        let inner = self.lock_active("stats")?;
        Ok(inner.stats())
    }

    /// Destroy the arena, returning every committed byte to the VM backing
    ///
    /// Pools, threads and roots still registered are torn down with it. All
    /// later calls through any clone of this handle fail with
    /// [`ArenaError::Destroyed`].
    pub fn destroy(&self) -> ArenaResult<ArenaTeardown> {
        let mut inner = self.lock_active("destroy")?;
        let _span = OperationSpan::new("destroy", self.id);
        let teardown = inner.teardown();
        info!(
            arena = self.id,
            pools = teardown.pools_destroyed,
            threads = teardown.threads_deregistered,
            roots = teardown.roots_destroyed,
            bytes_released = teardown.bytes_released,
            "Arena destroyed"
        );
        Ok(teardown)
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena").field("id", &self.id).finish_non_exhaustive()
    }
}

impl ArenaInner {
    /// Resolve a pool handle against this arena's registry
    pub(crate) fn pool_in<'a>(
        registry: &'a mut Registry,
        arena: ArenaId,
        pool: &PoolRef,
    ) -> ArenaResult<&'a mut Pool> {
        if pool.arena != arena {
            return Err(ArenaError::ForeignHandle {
                handle: pool.to_string(),
                owner: pool.arena,
                arena,
            });
        }
        registry
            .pool_mut(pool.id)
            .ok_or(ArenaError::UnknownPool(*pool))
    }

    fn check_owner(&self, handle: &str, owner: ArenaId) -> ArenaResult<()> {
        if owner != self.id {
            return Err(ArenaError::ForeignHandle {
                handle: handle.to_string(),
                owner,
                arena: self.id,
            });
        }
        Ok(())
    }

    fn set_commit_limit(&mut self, bytes: Size) {
        self.governor.set_limit(bytes);
        let outcome = self.reservoir.rebalance(&mut self.governor, self.vm.as_mut());
        self.pressure = MemoryPressure::of(self.governor.committed(), self.governor.limit());
        debug!(
            arena = self.id,
            released = outcome.released,
            grown = outcome.grown,
            committed = self.governor.committed(),
            pressure = %self.pressure,
            "Reservoir rebalanced after commit limit change"
        );
    }

    fn set_reservoir_limit(&mut self, bytes: Size) {
        let previous = self.reservoir.set_limit(bytes);
        let limit = self.reservoir.limit();
        let (released, grown) = if limit < previous {
            (self.reservoir.shrink(&mut self.governor, self.vm.as_mut()), 0)
        } else {
            let outcome = self.reservoir.rebalance(&mut self.governor, self.vm.as_mut());
            (outcome.released, outcome.grown)
        };
        info!(
            arena = self.id,
            previous,
            limit,
            released,
            grown,
            available = self.reservoir.available(),
            deficit = self.reservoir.deficit(),
            "Reservoir limit changed"
        );
    }

    fn stats(&self) -> ArenaStats {
        ArenaStats {
            arena: self.id,
            state: self.state,
            committed: self.governor.committed(),
            commit_limit: (!self.governor.is_unbounded()).then_some(self.governor.limit()),
            reservoir_limit: self.reservoir.limit(),
            reservoir_available: self.reservoir.available(),
            reservoir_deficit: self.reservoir.deficit(),
            reservoir_largest_extent: self.reservoir.largest_extent(),
            vm_reserved: self.vm.reserved(),
            pools: self.registry.pool_count(),
            threads: self.registry.thread_count(),
            roots: self.registry.root_count(),
            pressure: MemoryPressure::of(self.governor.committed(), self.governor.limit()),
        }
    }

    /// Release everything and mark the arena destroyed
    fn teardown(&mut self) -> ArenaTeardown {
        let mut bytes_released = 0;

        let (threads_deregistered, roots_destroyed) = self.registry.clear_threads_and_roots();

        let pools = self.registry.drain_pools();
        let pools_destroyed = pools.len();
        for mut pool in pools {
            for segment in pool.take_segments() {
                bytes_released += segment.size;
                self.governor.decommit(self.vm.as_mut(), segment);
            }
        }

        bytes_released += self.reservoir.drain(&mut self.governor, self.vm.as_mut());

        if let Some(control) = self.control.take() {
            bytes_released += control.size;
            self.governor.decommit(self.vm.as_mut(), control);
        }

        self.state = ArenaState::Destroyed;
        ArenaTeardown {
            pools_destroyed,
            threads_deregistered,
            roots_destroyed,
            bytes_released,
        }
    }
}

impl Drop for ArenaInner {
    fn drop(&mut self) {
        if self.state == ArenaState::Active {
            warn!(
                arena = self.id,
                committed = self.governor.committed(),
                pools = self.registry.pool_count(),
                "Arena dropped without being destroyed"
            );
            self.teardown();
        }
    }
}
