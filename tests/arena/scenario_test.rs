/*!
 * Reservoir Pressure Scenario
 * Drives one arena through reservoir funding, starvation under a tight
 * commit limit, and exhaustion through both allocation paths
 */

use pretty_assertions::assert_eq;
use reservoir_arena::{Arena, ArenaError, PoolConfig, Size};

const MB: Size = 1024 * 1024;

/// Words per test object
const OBJECT_WORDS: usize = 10;

/// Ten references plus a header word
const OBJECT_SIZE: Size = (OBJECT_WORDS + 1) * std::mem::size_of::<u64>();

const ATTEMPTS: usize = 100_000;

fn spill(arena: &Arena) -> isize {
    arena.committed_and_used().unwrap() as isize - arena.commit_limit().unwrap() as isize
}

#[test]
fn test_reservoir_under_commit_pressure() {
    let arena = Arena::create(64 * MB).expect("arena creation");
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();

    // No reservoir configured
    assert_eq!(arena.reservoir_limit().unwrap(), 0);
    assert_eq!(arena.reservoir_available().unwrap(), 0);

    // Fully funded under an unbounded commit limit
    arena.set_reservoir_limit(5 * MB).unwrap();
    let avail1 = arena.reservoir_available().unwrap();
    assert!(avail1 >= 5 * MB && avail1 < 6 * MB, "available = {}", avail1);
    assert_eq!(arena.reservoir_deficit().unwrap(), 0);

    // Tiny targets round up to one page
    arena.set_reservoir_limit(1045).unwrap();
    let lim2 = arena.reservoir_limit().unwrap();
    assert!(lim2 > 1045 && lim2 < 32768, "limit = {}", lim2);
    assert_eq!(arena.reservoir_available().unwrap(), lim2);

    // Starved by a tight commit limit
    let committed = arena.committed_and_used().unwrap();
    arena.set_commit_limit(committed + MB).unwrap();
    arena.set_reservoir_limit(10 * MB).unwrap();
    let deficit3 = arena.reservoir_deficit().unwrap();
    assert!(deficit3 > 8_000_000, "deficit = {}", deficit3);
    assert!(spill(&arena) <= 0);

    // Raising the commit limit feeds the reservoir
    let avail3 = arena.reservoir_available().unwrap();
    let committed = arena.committed_and_used().unwrap();
    arena.set_commit_limit(committed + 512 * 1024).unwrap();
    let avail4 = arena.reservoir_available().unwrap();
    assert!(avail4 - avail3 > 500_000, "grew by {}", avail4 - avail3);
    assert!(spill(&arena) <= 0);

    // Normal path: fails fast, reservoir untouched
    let mut normal_ok = 0;
    let mut normal_failure = None;
    for _ in 0..ATTEMPTS {
        match arena.allocate_normal(&pool, OBJECT_SIZE) {
            Ok(_) => normal_ok += 1,
            Err(e) => {
                normal_failure = Some(e);
                break;
            }
        }
    }
    assert!(normal_ok < 20, "normal successes = {}", normal_ok);
    assert!(matches!(
        normal_failure,
        Some(ArenaError::CommitLimitExceeded { .. })
    ));
    assert_eq!(arena.reservoir_available().unwrap(), avail4);

    // Emergency path: runs on the reservoir until it is gone
    let committed_before = arena.committed_and_used().unwrap();
    let mut emergency_ok = 0;
    let mut emergency_failure = None;
    for _ in 0..ATTEMPTS {
        match arena.allocate_emergency(&pool, OBJECT_SIZE) {
            Ok(_) => emergency_ok += 1,
            Err(e) => {
                emergency_failure = Some(e);
                break;
            }
        }
    }
    assert!(emergency_ok > 10_000, "emergency successes = {}", emergency_ok);
    assert!(matches!(
        emergency_failure,
        Some(ArenaError::OutOfMemory {
            reservoir_available: 0,
            ..
        })
    ));
    let avail6 = arena.reservoir_available().unwrap();
    assert!(avail4 - avail6 > MB, "shrunk by {}", avail4 - avail6);
    assert_eq!(arena.committed_and_used().unwrap(), committed_before);
    assert!(spill(&arena) <= 0);

    // Destroying the pool hands its segments back to the reservoir
    arena.destroy_pool(&pool).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), avail4);
    assert_eq!(arena.committed_and_used().unwrap(), committed_before);

    let teardown = arena.destroy().unwrap();
    assert_eq!(teardown.bytes_released, committed_before);
    assert_eq!(teardown.pools_destroyed, 0);
}

#[test]
fn test_emergency_success_count_matches_reservoir_layout() {
    let arena = Arena::create(16 * MB).unwrap();
    let pool = arena
        .create_pool(PoolConfig::generational().with_extend_by(64 * 1024))
        .unwrap();
    arena.set_reservoir_limit(256 * 1024).unwrap();
    arena
        .set_commit_limit(arena.committed_and_used().unwrap())
        .unwrap();

    let mut successes = 0;
    while arena.allocate_emergency(&pool, OBJECT_SIZE).is_ok() {
        successes += 1;
    }

    // Four 64KiB segments, each holding 744 objects of 88 bytes
    assert_eq!(successes, 4 * (64 * 1024 / OBJECT_SIZE));
    assert_eq!(arena.reservoir_available().unwrap(), 0);
    arena.destroy().unwrap();
}
