/*!
 * arenactl - Arena Pressure Driver
 *
 * Creates an arena from the environment (see `ArenaConfig::from_env`), fills
 * a pool through the normal path until the commit limit refuses, continues
 * through the emergency path until the reservoir runs dry, then prints the
 * arena statistics as JSON.
 *
 * Usage: arenactl [OBJECT_SIZE]
 */

use anyhow::{Context, Result};
use reservoir_arena::core::{bytes_to_mb, mb_to_bytes};
use reservoir_arena::{init_tracing, Arena, ArenaConfig, ArenaError, PoolConfig};
use serde::Serialize;
use tracing::{info, warn};

const DEFAULT_OBJECT_SIZE: usize = 88;

/// Headroom granted above the initial commit when no limit is configured
const DEFAULT_HEADROOM: usize = mb_to_bytes(1);

#[derive(Debug, Default, Serialize)]
struct PhaseReport {
    allocated: usize,
    bytes: usize,
    stopped_by: Option<String>,
}

#[derive(Serialize)]
struct Report {
    object_size: usize,
    normal: PhaseReport,
    emergency: PhaseReport,
    refilled: usize,
    stats: reservoir_arena::ArenaStats,
}

fn run_phase(
    label: &str,
    mut allocate: impl FnMut() -> Result<usize, ArenaError>,
) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    loop {
        match allocate() {
            Ok(size) => {
                report.allocated += 1;
                report.bytes += size;
            }
            Err(e) if e.is_commit_limit() || e.is_out_of_memory() => {
                info!(
                    phase = label,
                    allocated = report.allocated,
                    error = %e,
                    "Phase finished"
                );
                report.stopped_by = Some(e.to_string());
                return Ok(report);
            }
            Err(e) => return Err(e).with_context(|| format!("{} phase failed", label)),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let object_size = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<usize>()
            .with_context(|| format!("invalid object size {:?}", arg))?,
        None => DEFAULT_OBJECT_SIZE,
    };

    let config = ArenaConfig::from_env().context("loading arena configuration")?;
    info!(
        vm_mb = bytes_to_mb(config.vm_size),
        commit_limit = ?config.commit_limit,
        reservoir_limit = config.reservoir_limit,
        "Starting arena pressure run"
    );

    let arena = Arena::with_config(&config).context("creating arena")?;
    if config.commit_limit.is_none() {
        let committed = arena.committed_and_used()?;
        arena.set_commit_limit(committed + DEFAULT_HEADROOM)?;
        warn!(
            limit = committed + DEFAULT_HEADROOM,
            "No commit limit configured; bounding the run"
        );
    }

    let pool = arena.create_pool(PoolConfig::generational())?;

    let normal = run_phase("normal", || {
        arena.allocate_normal(&pool, object_size).map(|r| r.size)
    })?;
    let emergency = run_phase("emergency", || {
        arena.allocate_emergency(&pool, object_size).map(|r| r.size)
    })?;

    arena.destroy_pool(&pool)?;
    let refilled = arena.refill_reservoir()?;

    let report = Report {
        object_size,
        normal,
        emergency,
        refilled,
        stats: arena.stats()?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    let teardown = arena.destroy()?;
    info!(bytes_released = teardown.bytes_released, "Arena pressure run complete");
    Ok(())
}
