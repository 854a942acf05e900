/*!
 * Allocation Router
 *
 * The two ways a pool obtains memory from its arena.
 *
 * ## Normal path
 * Carve from the pool's buffer; otherwise commit a new segment through the
 * governor. A refused full segment is retried once at minimal size. The
 * reservoir is never touched, so under a tight commit limit the caller sees
 * `CommitLimitExceeded` with the reservoir intact.
 *
 * ## Emergency path
 * Carve from the pool's buffer; otherwise draw a segment from the reservoir,
 * falling back to a governed commit only when the reservoir cannot supply
 * one. When both fail the result is `OutOfMemory`. The reservoir is not
 * refilled here.
 */

use super::governor::CommitGovernor;
use super::types::{ArenaError, ArenaResult, MemoryPressure, Region};
use super::ArenaInner;
use crate::core::types::{PoolRef, Size};
use crate::pool::Pool;
use crate::vm::{Chunk, VmBacking};
use tracing::{debug, warn};

/// Commit a segment, retrying once at minimal size if the limit refuses the full one
fn commit_segment(
    governor: &mut CommitGovernor,
    vm: &mut dyn VmBacking,
    full: Size,
    minimal: Size,
) -> ArenaResult<Chunk> {
    match governor.commit(vm, full) {
        Err(ArenaError::CommitLimitExceeded { .. }) if minimal < full => {
            governor.commit(vm, minimal)
        }
        other => other,
    }
}

/// Install `chunk` and carve the object that asked for it
fn carve_from(pool: &mut Pool, pool_ref: &PoolRef, chunk: Chunk, size: Size) -> ArenaResult<Region> {
    pool.install_segment(chunk);
    let base = pool.try_carve(size).ok_or(ArenaError::OutOfMemory {
        requested: size,
        reservoir_available: 0,
    })?;
    Ok(Region {
        pool: *pool_ref,
        base,
        size,
    })
}

impl ArenaInner {
    pub(super) fn allocate_normal(&mut self, pool_ref: &PoolRef, size: Size) -> ArenaResult<Region> {
        let arena = self.id;
        let reservoir_available = self.reservoir.available();
        let pool = Self::pool_in(&mut self.registry, arena, pool_ref)?;
        let size = pool.object_size(size)?;

        if let Some(base) = pool.try_carve(size) {
            return Ok(Region {
                pool: *pool_ref,
                base,
                size,
            });
        }

        let full = pool.segment_request(size);
        let minimal = pool.minimal_segment(size);
        let chunk = commit_segment(&mut self.governor, self.vm.as_mut(), full, minimal).map_err(
            |e| match e {
                ArenaError::OutOfMemory { requested, .. } => ArenaError::OutOfMemory {
                    requested,
                    reservoir_available,
                },
                other => other,
            },
        )?;
        debug!(
            arena,
            pool = %pool_ref,
            segment = chunk.size,
            committed = self.governor.committed(),
            "Normal path committed segment"
        );

        let region = carve_from(pool, pool_ref, chunk, size)?;
        self.note_pressure();
        Ok(region)
    }

    pub(super) fn allocate_emergency(&mut self, pool_ref: &PoolRef, size: Size) -> ArenaResult<Region> {
        let arena = self.id;
        let pool = Self::pool_in(&mut self.registry, arena, pool_ref)?;
        let size = pool.object_size(size)?;

        if let Some(base) = pool.try_carve(size) {
            return Ok(Region {
                pool: *pool_ref,
                base,
                size,
            });
        }

        let full = pool.segment_request(size);
        let minimal = pool.minimal_segment(size);
        let drawn = self
            .reservoir
            .draw(full)
            .or_else(|| self.reservoir.draw(minimal));

        let chunk = match drawn {
            Some(chunk) => {
                debug!(
                    arena,
                    pool = %pool_ref,
                    segment = chunk.size,
                    reservoir_available = self.reservoir.available(),
                    reservoir_deficit = self.reservoir.deficit(),
                    "Emergency path drew segment from reservoir"
                );
                chunk
            }
            None => match commit_segment(&mut self.governor, self.vm.as_mut(), full, minimal) {
                Ok(chunk) => {
                    debug!(
                        arena,
                        pool = %pool_ref,
                        segment = chunk.size,
                        committed = self.governor.committed(),
                        "Emergency path committed segment"
                    );
                    chunk
                }
                Err(e) => {
                    let reservoir_available = self.reservoir.available();
                    warn!(
                        arena,
                        pool = %pool_ref,
                        requested = size,
                        reservoir_available,
                        error = %e,
                        "Emergency allocation failed"
                    );
                    return Err(ArenaError::OutOfMemory {
                        requested: size,
                        reservoir_available,
                    });
                }
            },
        };

        carve_from(pool, pool_ref, chunk, size)
    }

    /// Track pressure transitions caused by normal-path commits
    fn note_pressure(&mut self) {
        let pressure = MemoryPressure::of(self.governor.committed(), self.governor.limit());
        if pressure > self.pressure && pressure >= MemoryPressure::High {
            warn!(
                arena = self.id,
                pressure = %pressure,
                committed = self.governor.committed(),
                limit = self.governor.limit(),
                "Memory pressure rising"
            );
        }
        self.pressure = pressure;
    }
}
