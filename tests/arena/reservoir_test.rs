/*!
 * Reservoir Tests
 * Funding, starvation, shrinking and refill
 */

use pretty_assertions::assert_eq;
use reservoir_arena::{Arena, PoolConfig};

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const PAGE: usize = 4 * KB;

fn arena() -> Arena {
    Arena::create(32 * MB).unwrap()
}

#[test]
fn test_limit_is_page_rounded() {
    let arena = arena();
    arena.set_reservoir_limit(1).unwrap();
    assert_eq!(arena.reservoir_limit().unwrap(), PAGE);
    arena.set_reservoir_limit(PAGE).unwrap();
    assert_eq!(arena.reservoir_limit().unwrap(), PAGE);
    arena.set_reservoir_limit(0).unwrap();
    assert_eq!(arena.reservoir_limit().unwrap(), 0);
    assert_eq!(arena.reservoir_available().unwrap(), 0);
    arena.destroy().unwrap();
}

#[test]
fn test_reservoir_counts_toward_committed() {
    let arena = arena();
    let base = arena.committed_and_used().unwrap();
    arena.set_reservoir_limit(2 * MB).unwrap();
    assert_eq!(arena.committed_and_used().unwrap(), base + 2 * MB);
    arena.set_reservoir_limit(MB).unwrap();
    assert_eq!(arena.committed_and_used().unwrap(), base + MB);
    arena.destroy().unwrap();
}

#[test]
fn test_deficit_is_reported_not_raised() {
    let arena = arena();
    let committed = arena.committed_and_used().unwrap();
    arena.set_commit_limit(committed + 100 * KB).unwrap();
    arena.set_reservoir_limit(MB).unwrap();

    assert_eq!(arena.reservoir_limit().unwrap(), MB);
    assert_eq!(arena.reservoir_available().unwrap(), 100 * KB);
    assert_eq!(arena.reservoir_deficit().unwrap(), MB - 100 * KB);
    arena.destroy().unwrap();
}

#[test]
fn test_lowering_commit_limit_shrinks_reservoir() {
    let arena = arena();
    arena.set_reservoir_limit(4 * MB).unwrap();
    let committed = arena.committed_and_used().unwrap();

    arena.set_commit_limit(committed - MB).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), 3 * MB);
    assert_eq!(arena.committed_and_used().unwrap(), committed - MB);

    // Below everything the reservoir holds: it empties, pool memory stays
    arena.set_commit_limit(0).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), 0);
    assert!(arena.committed_and_used().unwrap() > 0);
    arena.destroy().unwrap();
}

#[test]
fn test_lowering_target_never_grows() {
    let arena = arena();
    let committed = arena.committed_and_used().unwrap();
    arena.set_commit_limit(committed + MB).unwrap();
    arena.set_reservoir_limit(4 * MB).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), MB);

    // Headroom appears, then the target is lowered but still above availability
    arena.set_commit_limit(usize::MAX).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), 4 * MB);
    arena.set_commit_limit(arena.committed_and_used().unwrap()).unwrap();
    let available = arena.reservoir_available().unwrap();
    arena.set_reservoir_limit(2 * MB).unwrap();
    assert!(arena.reservoir_available().unwrap() <= available);
    assert_eq!(arena.reservoir_available().unwrap(), 2 * MB);
    arena.destroy().unwrap();
}

#[test]
fn test_emergency_draw_is_not_refilled_until_asked() {
    let arena = arena();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    arena.set_reservoir_limit(MB).unwrap();

    arena.allocate_emergency(&pool, 64).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), MB - 64 * KB);
    assert_eq!(arena.reservoir_deficit().unwrap(), 64 * KB);

    let committed = arena.committed_and_used().unwrap();
    assert_eq!(arena.refill_reservoir().unwrap(), 64 * KB);
    assert_eq!(arena.reservoir_deficit().unwrap(), 0);
    assert_eq!(arena.committed_and_used().unwrap(), committed + 64 * KB);

    // Nothing left to gain
    assert_eq!(arena.refill_reservoir().unwrap(), 0);
    arena.destroy().unwrap();
}

#[test]
fn test_refill_respects_commit_limit() {
    let arena = arena();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    arena.set_reservoir_limit(MB).unwrap();
    arena
        .set_commit_limit(arena.committed_and_used().unwrap())
        .unwrap();

    arena.allocate_emergency(&pool, 64).unwrap();
    assert_eq!(arena.refill_reservoir().unwrap(), 0);
    assert_eq!(arena.reservoir_deficit().unwrap(), 64 * KB);
    arena.destroy().unwrap();
}

#[test]
fn test_destroyed_pool_memory_is_capped_at_limit() {
    let arena = arena();
    arena.set_reservoir_limit(64 * KB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    for _ in 0..8 {
        arena.allocate_normal(&pool, 60 * KB).unwrap();
    }
    let committed = arena.committed_and_used().unwrap();

    arena.destroy_pool(&pool).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), 64 * KB);
    assert_eq!(arena.committed_and_used().unwrap(), committed - 8 * 64 * KB);
    arena.destroy().unwrap();
}
