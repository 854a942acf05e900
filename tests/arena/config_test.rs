/*!
 * Configuration Tests
 * Arenas built from environment configuration
 */

use pretty_assertions::assert_eq;
use reservoir_arena::{Arena, ArenaConfig, ConfigError};
use serial_test::serial;
use std::env;

const MB: usize = 1024 * 1024;

const VARS: [&str; 3] = [
    "ARENA_VM_SIZE",
    "ARENA_COMMIT_LIMIT",
    "ARENA_RESERVOIR_LIMIT",
];

fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    for name in VARS {
        env::remove_var(name);
    }
    for (name, value) in vars {
        env::set_var(name, value);
    }
    let result = f();
    for name in VARS {
        env::remove_var(name);
    }
    result
}

#[test]
#[serial]
fn test_arena_from_env() {
    let config = with_env(
        &[
            ("ARENA_VM_SIZE", "16MiB"),
            ("ARENA_COMMIT_LIMIT", "1M"),
            ("ARENA_RESERVOIR_LIMIT", "2M"),
        ],
        ArenaConfig::from_env,
    )
    .unwrap();

    let arena = Arena::with_config(&config).unwrap();
    let stats = arena.stats().unwrap();
    assert_eq!(stats.vm_reserved, 16 * MB);
    assert_eq!(stats.commit_limit, Some(MB));
    assert_eq!(stats.reservoir_limit, 2 * MB);
    assert_eq!(stats.committed, MB);
    assert_eq!(stats.reservoir_deficit, 2 * MB - stats.reservoir_available);
    arena.destroy().unwrap();
}

#[test]
#[serial]
fn test_bad_env_value_is_reported() {
    let err = with_env(&[("ARENA_VM_SIZE", "16 parsecs")], ArenaConfig::from_env).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSize { ref variable, .. } if variable == "ARENA_VM_SIZE"));
    assert!(err.to_string().contains("16 parsecs"));
}

#[test]
fn test_config_round_trips_through_json() {
    let config = ArenaConfig::new(8 * MB).with_commit_limit(4 * MB);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: ArenaConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_default_config_creates_unbounded_arena() {
    let arena = Arena::with_config(&ArenaConfig::default()).unwrap();
    assert_eq!(arena.commit_limit().unwrap(), usize::MAX);
    assert_eq!(arena.reservoir_limit().unwrap(), 0);
    arena.destroy().unwrap();
}
