/*!
 * Pool Tests
 * Segment acquisition, manual free and pool classes through the arena
 */

use pretty_assertions::assert_eq;
use reservoir_arena::{Arena, ArenaError, ErrorClass, PoolClass, PoolConfig, PoolInfo};

const KB: usize = 1024;
const MB: usize = 1024 * KB;

#[test]
fn test_pool_info_tracks_usage() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    for _ in 0..10 {
        arena.allocate_normal(&pool, 100).unwrap();
    }
    assert_eq!(
        arena.pool_info(&pool).unwrap(),
        PoolInfo {
            class: PoolClass::Generational,
            segments: 1,
            committed_bytes: 64 * KB,
            allocated_bytes: 10 * 104,
            mean_size: None,
            free_bytes: 0,
            object_count: 10,
        }
    );
    arena.destroy().unwrap();
}

fn pool_config_from_json(extend_by: usize) -> PoolConfig {
    serde_json::from_str(&format!(
        r#"{{"class":"generational","extend_by":{extend_by},"mean_size":null,"max_size":null}}"#
    ))
    .unwrap()
}

#[test]
fn test_deserialized_extend_by_is_page_rounded() {
    let arena = Arena::create(64 * MB).unwrap();
    let pool = arena.create_pool(pool_config_from_json(5000)).unwrap();
    let before = arena.committed_and_used().unwrap();

    let region = arena.allocate_normal(&pool, 64).unwrap();
    assert_eq!(region.size, 64);
    assert_eq!(arena.pool_info(&pool).unwrap().committed_bytes, 8 * KB);
    assert_eq!(arena.committed_and_used().unwrap(), before + 8 * KB);
    arena.destroy().unwrap();
}

#[test]
fn test_deserialized_extend_by_draws_whole_pages_from_reservoir() {
    let arena = Arena::create(64 * MB).unwrap();
    arena.set_reservoir_limit(64 * KB).unwrap();
    arena
        .set_commit_limit(arena.committed_and_used().unwrap())
        .unwrap();
    let pool = arena.create_pool(pool_config_from_json(5000)).unwrap();

    assert!(arena.allocate_normal(&pool, 64).unwrap_err().is_commit_limit());
    arena.allocate_emergency(&pool, 64).unwrap();
    assert_eq!(arena.reservoir_available().unwrap(), 56 * KB);
    assert_eq!(arena.reservoir_deficit().unwrap(), 8 * KB);
    assert_eq!(arena.pool_info(&pool).unwrap().committed_bytes, 8 * KB);
    arena.destroy().unwrap();
}

#[test]
fn test_manual_pool_reports_mean_size() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena
        .create_pool(PoolConfig::manual(16 * KB, 64, 4 * KB))
        .unwrap();
    let info = arena.pool_info(&pool).unwrap();
    assert_eq!(info.class, PoolClass::ManualVariable);
    assert_eq!(info.mean_size, Some(64));
    arena.destroy().unwrap();
}

#[test]
fn test_regions_are_aligned_and_disjoint() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    let mut regions: Vec<_> = (1..200)
        .map(|size| arena.allocate_normal(&pool, size).unwrap())
        .collect();
    regions.sort_by_key(|r| r.base);

    for pair in regions.windows(2) {
        assert!(pair[0].end() <= pair[1].base);
    }
    assert!(regions.iter().all(|r| r.base % 8 == 0 && r.size % 8 == 0));
    arena.destroy().unwrap();
}

#[test]
fn test_large_object_gets_dedicated_segment() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    let region = arena.allocate_normal(&pool, 300 * KB).unwrap();
    assert_eq!(region.size, 300 * KB);
    assert_eq!(arena.pool_info(&pool).unwrap().committed_bytes, 300 * KB);
    arena.destroy().unwrap();
}

#[test]
fn test_manual_pool_free_and_reuse() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena
        .create_pool(PoolConfig::manual(16 * KB, 64, 4 * KB))
        .unwrap();

    let a = arena.allocate_normal(&pool, 256).unwrap();
    let b = arena.allocate_normal(&pool, 256).unwrap();
    arena.free(&a).unwrap();
    assert_eq!(arena.pool_info(&pool).unwrap().object_count, 1);

    let c = arena.allocate_normal(&pool, 200).unwrap();
    assert_eq!(c.base, a.base);
    assert_ne!(c.base, b.base);

    // Double free is caught
    arena.free(&b).unwrap();
    assert!(matches!(
        arena.free(&b),
        Err(ArenaError::InvalidRegion { .. })
    ));
    arena.destroy().unwrap();
}

#[test]
fn test_manual_pool_enforces_max_size() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena
        .create_pool(PoolConfig::manual(16 * KB, 64, 4 * KB))
        .unwrap();
    let err = arena.allocate_emergency(&pool, 4 * KB + 1).unwrap_err();
    assert!(matches!(err, ArenaError::InvalidSize { size, .. } if size == 4 * KB + 1));
    assert_eq!(err.class(), ErrorClass::InvalidRequest);
    arena.destroy().unwrap();
}

#[test]
fn test_zero_size_is_rejected_on_both_paths() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    assert!(matches!(
        arena.allocate_normal(&pool, 0),
        Err(ArenaError::InvalidSize { size: 0, .. })
    ));
    assert!(matches!(
        arena.allocate_emergency(&pool, 0),
        Err(ArenaError::InvalidSize { size: 0, .. })
    ));
    arena.destroy().unwrap();
}

#[test]
fn test_generational_pool_rejects_free() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    let region = arena.allocate_normal(&pool, 64).unwrap();
    assert_eq!(
        arena.free(&region).unwrap_err(),
        ArenaError::Unsupported {
            operation: "free",
            class: PoolClass::Generational,
        }
    );
    arena.destroy().unwrap();
}

#[test]
fn test_emergency_falls_back_to_commit_without_reservoir() {
    let arena = Arena::create(8 * MB).unwrap();
    let pool = arena.create_pool(PoolConfig::generational()).unwrap();
    let committed = arena.committed_and_used().unwrap();

    arena.allocate_emergency(&pool, 64).unwrap();
    assert_eq!(arena.committed_and_used().unwrap(), committed + 64 * KB);
    assert_eq!(arena.reservoir_available().unwrap(), 0);
    arena.destroy().unwrap();
}
