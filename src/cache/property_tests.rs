//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the entry store's accounting and expiration rules.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use crate::cache::CacheStore;
use crate::clock::ManualClock;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 1000;
const TEST_MAX_VALUE_SIZE: usize = 1024;

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,32}".prop_map(|s| s)
}

/// Generates valid cache values (within size limit)
fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,128}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Remove { key: String },
    Exists { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Remove { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Exists { key }),
    ]
}

fn manual_store() -> (CacheStore<String>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    (
        CacheStore::with_clock(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE, clock.clone()),
        clock,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Hits and misses match the outcome of every get; exists never counts.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let store: CacheStore<String> = CacheStore::new(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE);
        let mut model: HashMap<String, String> = HashMap::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key.clone(), value.clone(), None).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Get { key } => match store.get(&key) {
                    Ok(value) => {
                        prop_assert_eq!(Some(&value), model.get(&key));
                        expected_hits += 1;
                    }
                    Err(_) => {
                        prop_assert!(!model.contains_key(&key));
                        expected_misses += 1;
                    }
                },
                CacheOp::Remove { key } => {
                    let removed = store.remove(&key).unwrap();
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                }
                CacheOp::Exists { key } => {
                    prop_assert_eq!(store.exists(&key), model.contains_key(&key));
                }
            }
        }

        let info = store.info();
        prop_assert_eq!(info.hits_total, expected_hits, "Hits mismatch");
        prop_assert_eq!(info.misses_total, expected_misses, "Misses mismatch");
        prop_assert_eq!(info.entry_count, model.len(), "Entry count mismatch");
    }

    // N gets on N distinct never-expiring keys add exactly N to hits + misses.
    #[test]
    fn prop_hit_miss_sum(keys in prop::collection::hash_set(valid_key_strategy(), 1..50)) {
        let store: CacheStore<String> = CacheStore::new(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE);
        for (i, key) in keys.iter().enumerate() {
            if i % 2 == 0 {
                store.set(key.clone(), "v".to_string(), None).unwrap();
            }
        }

        for key in &keys {
            let _ = store.get(key);
        }

        let info = store.info();
        prop_assert_eq!(info.hits_total + info.misses_total, keys.len() as u64);
    }

    // Removing an absent key succeeds every time.
    #[test]
    fn prop_remove_is_idempotent(key in valid_key_strategy(), value in valid_value_strategy()) {
        let store: CacheStore<String> = CacheStore::new(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE);
        store.set(key.clone(), value, None).unwrap();

        prop_assert!(store.remove(&key).unwrap());
        prop_assert!(!store.remove(&key).unwrap());
        prop_assert!(!store.remove(&key).unwrap());
        prop_assert!(store.get(&key).is_err());
    }

    // The last write to a key wins and there is only ever one entry for it.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let store: CacheStore<String> = CacheStore::new(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE);

        store.set(key.clone(), value1, Some(30)).unwrap();
        store.set(key.clone(), value2.clone(), None).unwrap();

        prop_assert_eq!(store.get(&key).unwrap(), value2);
        prop_assert_eq!(store.len(), 1);
    }

    // An entry is a hit strictly before its deadline and a miss from it on.
    #[test]
    fn prop_ttl_correctness(
        key in valid_key_strategy(),
        value in valid_value_strategy(),
        ttl in 1u64..3600,
        elapsed in 0u64..7200
    ) {
        let (store, clock) = manual_store();
        store.set(key.clone(), value.clone(), Some(ttl)).unwrap();

        clock.advance(Duration::seconds(elapsed as i64));
        let result = store.get(&key);

        let info = store.info();
        if elapsed < ttl {
            prop_assert_eq!(result.unwrap(), value);
            prop_assert_eq!(info.hits_total, 1);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(info.misses_total, 1);
        }
    }

    // A bulk get counts each distinct key exactly once.
    #[test]
    fn prop_bulk_get_accounting(
        stored in prop::collection::hash_set(valid_key_strategy(), 0..20),
        requested in prop::collection::vec(valid_key_strategy(), 1..40)
    ) {
        let store: CacheStore<String> = CacheStore::new(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE);
        for key in &stored {
            store.set(key.clone(), key.clone(), None).unwrap();
        }

        let result = store.get_bulk(requested.as_slice()).unwrap();

        let distinct: HashSet<&String> = requested.iter().collect();
        let info = store.info();
        prop_assert_eq!(info.hits_total + info.misses_total, distinct.len() as u64);
        prop_assert_eq!(result.found.len() + result.missing.len(), distinct.len());
        for (key, value) in &result.found {
            prop_assert_eq!(key, value);
        }
    }
}

// == Property Test for Error Response Format ==
// This tests the CacheError -> HTTP response conversion

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_error_response_format(
        error_msg in "[a-zA-Z0-9 _-]{1,100}"
    ) {
        use crate::error::CacheError;
        use axum::response::IntoResponse;
        use axum::body::to_bytes;

        let error_variants = vec![
            CacheError::NotFound(error_msg.clone()),
            CacheError::Expired(error_msg.clone()),
            CacheError::InvalidArgument(error_msg.clone()),
            CacheError::CacheFull(error_msg.clone()),
            CacheError::Serialization(error_msg.clone()),
            CacheError::PreloadFailure { routine: "menu".to_string(), reason: error_msg.clone() },
            CacheError::SchedulerTick(error_msg.clone()),
            CacheError::Internal(error_msg.clone()),
        ];

        let rt = tokio::runtime::Runtime::new().unwrap();
        for error in error_variants {
            let expected_msg = error.to_string();
            let response = error.into_response();

            let content_type = response.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok());
            prop_assert!(
                content_type.map(|ct| ct.contains("application/json")).unwrap_or(false),
                "Response should have JSON content-type"
            );

            let bytes = rt.block_on(async {
                to_bytes(response.into_body(), usize::MAX).await.unwrap()
            });
            let json: serde_json::Value = serde_json::from_slice(&bytes)
                .expect("Response body should be valid JSON");

            prop_assert_eq!(json["error"].as_str(), Some(expected_msg.as_str()));
        }
    }
}

// == Property Test for Concurrent Operation Correctness ==
// Readers racing writers on a shared store never see a torn value.

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_concurrent_operation_correctness(
        initial_entries in prop::collection::vec(
            (valid_key_strategy(), valid_value_strategy()),
            1..20
        ),
        operations in prop::collection::vec(cache_op_strategy(), 10..60)
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .build()
            .unwrap();

        rt.block_on(async {
            let store: Arc<CacheStore<String>> =
                Arc::new(CacheStore::new(TEST_MAX_ENTRIES, TEST_MAX_VALUE_SIZE));

            for (key, value) in &initial_entries {
                store.set(key.clone(), value.clone(), None).unwrap();
            }

            // Every value ever written, per key
            let mut written: HashMap<String, HashSet<String>> = HashMap::new();
            for (key, value) in &initial_entries {
                written.entry(key.clone()).or_default().insert(value.clone());
            }
            for op in &operations {
                if let CacheOp::Set { key, value } = op {
                    written.entry(key.clone()).or_default().insert(value.clone());
                }
            }
            let written = Arc::new(written);

            let mut handles = vec![];
            for op in operations {
                let store = Arc::clone(&store);
                let written = Arc::clone(&written);

                handles.push(tokio::spawn(async move {
                    match op {
                        CacheOp::Set { key, value } => {
                            store.set(key, value, None).map_err(|e| e.to_string())
                        }
                        CacheOp::Get { key } => {
                            if let Ok(value) = store.get(&key) {
                                let known = written
                                    .get(&key)
                                    .map(|values| values.contains(&value))
                                    .unwrap_or(false);
                                if !known {
                                    return Err(format!("Torn value for '{}': {}", key, value));
                                }
                            }
                            Ok(())
                        }
                        CacheOp::Remove { key } => store.remove(&key).map(|_| ()).map_err(|e| e.to_string()),
                        CacheOp::Exists { key } => {
                            store.exists(&key);
                            Ok(())
                        }
                    }
                }));
            }

            for handle in handles {
                let result = handle.await.expect("Task should not panic");
                prop_assert!(result.is_ok(), "Concurrent operation failed: {:?}", result);
            }

            let info = store.info();
            prop_assert!(info.entry_count <= TEST_MAX_ENTRIES);
            prop_assert!((0.0..=100.0).contains(&info.hit_rate_percent));
            Ok(())
        })?;
    }
}
