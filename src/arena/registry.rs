/*!
 * Arena Registry
 * Ownership sets for the pools, threads and roots created in an arena
 */

use crate::core::types::{PoolId, RootId, ThreadId};
use crate::pool::{Pool, PoolConfig};
use ahash::HashMap;
use serde::{Deserialize, Serialize};

/// How a root's references are interpreted by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootRank {
    /// Words that may or may not be references
    Ambiguous,
    /// Words known to be references
    Exact,
}

#[derive(Debug, Clone)]
pub(crate) struct ThreadRecord {
    pub name: Option<String>,
    pub roots: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RootRecord {
    pub rank: RootRank,
    pub thread: Option<ThreadId>,
}

/// Why a thread could not be deregistered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeregisterRefusal {
    Unknown,
    HasRoots(usize),
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pools: HashMap<PoolId, Pool>,
    threads: HashMap<ThreadId, ThreadRecord>,
    roots: HashMap<RootId, RootRecord>,
    next_pool: PoolId,
    next_thread: ThreadId,
    next_root: RootId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Pools
    // =========================================================================

    pub fn add_pool(&mut self, config: PoolConfig) -> PoolId {
        self.next_pool += 1;
        let id = self.next_pool;
        self.pools.insert(id, Pool::new(id, config));
        id
    }

    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    pub fn pool_mut(&mut self, id: PoolId) -> Option<&mut Pool> {
        self.pools.get_mut(&id)
    }

    pub fn remove_pool(&mut self, id: PoolId) -> Option<Pool> {
        self.pools.remove(&id)
    }

    /// Remove every pool, in id order
    pub fn drain_pools(&mut self) -> Vec<Pool> {
        let mut pools: Vec<Pool> = self.pools.drain().map(|(_, pool)| pool).collect();
        pools.sort_by_key(|pool| pool.id());
        pools
    }

    // =========================================================================
    // Threads
    // =========================================================================

    pub fn add_thread(&mut self, name: Option<String>) -> ThreadId {
        self.next_thread += 1;
        let id = self.next_thread;
        self.threads.insert(id, ThreadRecord { name, roots: 0 });
        id
    }

    pub fn remove_thread(&mut self, id: ThreadId) -> Result<ThreadRecord, DeregisterRefusal> {
        match self.threads.get(&id) {
            None => Err(DeregisterRefusal::Unknown),
            Some(record) if record.roots > 0 => Err(DeregisterRefusal::HasRoots(record.roots)),
            Some(_) => self.threads.remove(&id).ok_or(DeregisterRefusal::Unknown),
        }
    }

    // =========================================================================
    // Roots
    // =========================================================================

    /// Register a root; fails with the thread id if the attached thread is unknown
    pub fn add_root(&mut self, rank: RootRank, thread: Option<ThreadId>) -> Result<RootId, ThreadId> {
        if let Some(tid) = thread {
            self.threads.get_mut(&tid).ok_or(tid)?.roots += 1;
        }
        self.next_root += 1;
        let id = self.next_root;
        self.roots.insert(id, RootRecord { rank, thread });
        Ok(id)
    }

    pub fn remove_root(&mut self, id: RootId) -> Option<RootRecord> {
        let record = self.roots.remove(&id)?;
        if let Some(thread) = record.thread.and_then(|tid| self.threads.get_mut(&tid)) {
            thread.roots = thread.roots.saturating_sub(1);
        }
        Some(record)
    }

    /// Forget every thread and root; returns `(threads, roots)` removed
    pub fn clear_threads_and_roots(&mut self) -> (usize, usize) {
        let counts = (self.threads.len(), self.roots.len());
        self.roots.clear();
        self.threads.clear();
        counts
    }

    #[inline]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }
}
