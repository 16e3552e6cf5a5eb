//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check counters, capacity and recency ordering over
//! arbitrary operation sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheStore, KeyPattern};
use crate::config::CacheConfig;
use crate::persistence::{MemorySnapshotBackend, PersistenceOptions};

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 100;
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}".prop_map(|s| s)
}

/// Generates valid cache values
fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,256}".prop_map(|s| s)
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Has { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Has { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn unique(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Every get counts as exactly one hit or one miss; has never counts.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;
        let mut gets: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key, value, None).unwrap();
                }
                CacheOp::Get { key } => {
                    gets += 1;
                    match store.get(&key) {
                        Some(_) => expected_hits += 1,
                        None => expected_misses += 1,
                    }
                }
                CacheOp::Has { key } => {
                    store.has(&key);
                }
                CacheOp::Delete { key } => {
                    store.delete(&key);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.hits + stats.misses, gets);
        prop_assert!((0.0..=1.0).contains(&stats.hit_rate));
        prop_assert_eq!(stats.total_items, store.len(), "Total items mismatch");
    }

    // total_size always equals the sum of the live entries' sizes.
    #[test]
    fn prop_total_size_consistency(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut store = CacheStore::new(20, TEST_DEFAULT_TTL);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => { store.set(key, value, None).unwrap(); }
                CacheOp::Get { key } => { store.get(&key); }
                CacheOp::Has { key } => { store.has(&key); }
                CacheOp::Delete { key } => { store.delete(&key); }
            }
            let expected: usize = store
                .snapshot_entries()
                .iter()
                .map(|entry| entry.estimated_size)
                .sum();
            prop_assert_eq!(store.stats().total_size, expected);
        }
    }

    // Storing a value and reading it back before expiry returns it unchanged.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL);

        store.set(key.clone(), value.clone(), None).unwrap();

        prop_assert_eq!(store.get(&key), Some(value), "Round-trip value mismatch");
    }

    // Deleting twice is safe; the second delete reports nothing removed.
    #[test]
    fn prop_idempotent_delete(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL);
        store.set(key.clone(), value, None).unwrap();

        prop_assert!(store.delete(&key));
        let after_first = store.stats();
        prop_assert!(!store.delete(&key));
        prop_assert_eq!(store.stats(), after_first);
        prop_assert_eq!(store.get(&key), None);
    }

    // Setting the same key again replaces it without duplicating.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL);

        store.set(key.clone(), value1, None).unwrap();
        store.set(key.clone(), value2.clone(), None).unwrap();

        prop_assert_eq!(store.get(&key), Some(value2), "Overwrite should return new value");
        prop_assert_eq!(store.len(), 1, "Should have exactly one entry after overwrite");
    }

    // The entry count never exceeds max_size after a set completes.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec(
            (valid_key_strategy(), valid_value_strategy()),
            1..200
        ),
        max_size in 1usize..60
    ) {
        let mut store = CacheStore::new(max_size, TEST_DEFAULT_TTL);

        for (key, value) in entries {
            store.set(key, value, None).unwrap();
            prop_assert!(
                store.len() <= max_size,
                "Cache size {} exceeds max {}",
                store.len(),
                max_size
            );
        }
    }

    // Prefix invalidation removes exactly the matching keys.
    #[test]
    fn prop_namespace_invalidation(
        inside in prop::collection::vec(valid_key_strategy(), 0..20),
        outside in prop::collection::vec(valid_key_strategy(), 0..20)
    ) {
        let inside = unique(inside);
        let outside = unique(outside);
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL);

        for key in &inside {
            store.set(format!("ns:{key}"), "v".to_string(), None).unwrap();
        }
        for key in &outside {
            store.set(format!("other:{key}"), "v".to_string(), None).unwrap();
        }

        let removed = store.invalidate_pattern(&KeyPattern::namespace("ns"));
        prop_assert_eq!(removed, inside.len());
        prop_assert_eq!(store.len(), outside.len());
        prop_assert!(store.keys().iter().all(|k| k.starts_with("other:")));
    }
}

// Property tests for LRU eviction behavior
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // When a full store takes a new key, the least recently set key goes first.
    #[test]
    fn prop_lru_eviction_order(
        initial_keys in prop::collection::vec(valid_key_strategy(), 3..10),
        new_key in valid_key_strategy(),
        new_value in valid_value_strategy()
    ) {
        let unique_keys = unique(initial_keys);

        // Need at least 2 unique keys for meaningful test
        prop_assume!(unique_keys.len() >= 2);
        prop_assume!(!unique_keys.contains(&new_key));

        // Under 10 entries the batch is a single entry
        let capacity = unique_keys.len();
        let mut store = CacheStore::new(capacity, TEST_DEFAULT_TTL);

        let oldest_key = unique_keys[0].clone();
        for key in &unique_keys {
            store.set(key.clone(), format!("value_{}", key), None).unwrap();
        }
        prop_assert_eq!(store.len(), capacity, "Cache should be at capacity");

        store.set(new_key.clone(), new_value, None).unwrap();

        prop_assert_eq!(store.len(), capacity, "Cache should remain at capacity after eviction");
        prop_assert!(!store.has(&oldest_key), "Oldest key '{}' should have been evicted", oldest_key);
        prop_assert!(store.has(&new_key), "New key '{}' should exist after insertion", new_key);
        for key in unique_keys.iter().skip(1) {
            prop_assert!(store.has(key), "Key '{}' should still exist (not the oldest)", key);
        }
    }

    // A key read after another is never evicted before it.
    #[test]
    fn prop_lru_access_tracking(
        keys in prop::collection::vec(valid_key_strategy(), 3..8),
        new_key in valid_key_strategy(),
        new_value in valid_value_strategy()
    ) {
        let unique_keys = unique(keys);

        prop_assume!(unique_keys.len() >= 3);
        prop_assume!(!unique_keys.contains(&new_key));

        let capacity = unique_keys.len();
        let mut store = CacheStore::new(capacity, TEST_DEFAULT_TTL);

        for key in &unique_keys {
            store.set(key.clone(), format!("value_{}", key), None).unwrap();
        }

        // Reading the first key makes the second the eviction candidate
        let accessed_key = unique_keys[0].clone();
        let _ = store.get(&accessed_key);
        let expected_evicted = unique_keys[1].clone();

        store.set(new_key.clone(), new_value, None).unwrap();

        prop_assert!(
            store.has(&accessed_key),
            "Accessed key '{}' should not be evicted after being touched",
            accessed_key
        );
        prop_assert!(
            !store.has(&expected_evicted),
            "Key '{}' should have been evicted as it was oldest after access",
            expected_evicted
        );
        prop_assert!(store.has(&new_key), "New key should exist");
    }

    // Batch eviction removes ceil(10% of max_size) keys, all older than every survivor.
    #[test]
    fn prop_batch_eviction_removes_oldest(max_size in 1usize..80) {
        let mut store = CacheStore::new(max_size, TEST_DEFAULT_TTL);
        for i in 0..max_size {
            store.set(format!("k{i}"), "v".to_string(), None).unwrap();
        }

        store.set("overflow".to_string(), "v".to_string(), None).unwrap();

        let batch = ((max_size as f64) / 10.0).ceil().max(1.0) as usize;
        prop_assert_eq!(store.stats().evictions, batch as u64);
        for i in 0..max_size {
            prop_assert_eq!(store.has(&format!("k{i}")), i >= batch, "key k{}", i);
        }
    }
}

// == Property Test for Concurrent Operation Correctness ==
// Exercises the shared instance from many tasks at once.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_concurrent_operation_correctness(
        initial_entries in prop::collection::vec(
            (valid_key_strategy(), valid_value_strategy()),
            1..20
        ),
        operations in prop::collection::vec(cache_op_strategy(), 10..50)
    ) {
        tokio_test::block_on(async {
            let cache: Cache<String> = Cache::open(
                CacheConfig::new("concurrent").with_max_size(TEST_MAX_SIZE),
                None,
            )
            .await
            .unwrap();

            for (key, value) in &initial_entries {
                cache.set(key.clone(), value.clone(), None).await.unwrap();
            }

            let gets = operations
                .iter()
                .filter(|op| matches!(op, CacheOp::Get { .. }))
                .count() as u64;

            let mut handles = vec![];
            for op in operations {
                let cache = cache.clone();
                handles.push(tokio::spawn(async move {
                    match op {
                        CacheOp::Set { key, value } => {
                            cache.set(key, value, None).await.unwrap();
                        }
                        CacheOp::Get { key } => {
                            cache.get(&key).await;
                        }
                        CacheOp::Has { key } => {
                            cache.has(&key).await;
                        }
                        CacheOp::Delete { key } => {
                            cache.delete(&key).await;
                        }
                    }
                }));
            }

            for handle in handles {
                handle.await.expect("Task should not panic");
            }

            let stats = cache.stats().await;
            prop_assert!(stats.total_items <= TEST_MAX_SIZE, "Cache should not exceed max size");
            prop_assert_eq!(stats.hits + stats.misses, gets);
            prop_assert!(
                (0.0..=1.0).contains(&stats.hit_rate),
                "Hit rate should be between 0 and 1, got {}",
                stats.hit_rate
            );

            cache.destroy().await;
            Ok(())
        })?;
    }
}

// Snapshot persistence keeps every fresh entry across a destroy and reopen.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_persistence_roundtrip(
        entries in prop::collection::vec(
            (valid_key_strategy(), valid_value_strategy()),
            1..30
        )
    ) {
        tokio_test::block_on(async {
            let backend = Arc::new(MemorySnapshotBackend::new());
            let config = CacheConfig::new("persisted").with_persistent(true);

            let first: Cache<String> =
                Cache::open(config.clone(), Some(PersistenceOptions::new(backend.clone())))
                    .await
                    .unwrap();
            let mut expected = std::collections::HashMap::new();
            for (key, value) in entries {
                first.set(key.clone(), value.clone(), None).await.unwrap();
                expected.insert(key, value);
            }
            first.destroy().await;

            let second: Cache<String> =
                Cache::open(config, Some(PersistenceOptions::new(backend)))
                    .await
                    .unwrap();
            prop_assert_eq!(second.size().await, expected.len());
            for (key, value) in expected {
                prop_assert_eq!(second.get(&key).await, Some(value));
            }
            second.destroy().await;
            Ok(())
        })?;
    }
}
