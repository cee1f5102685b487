//! Bulk Operations
//!
//! Batched get/set/remove over the entry store. Each key is handled on its
//! own; a batch never aborts because one of its keys failed.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::cache::store::{validate_key, validate_ttl};
use crate::cache::CacheStore;
use crate::error::{CacheError, Result};

// == Bulk Results ==
/// Outcome of [`CacheStore::get_bulk`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkGetResult<V> {
    pub found: BTreeMap<String, V>,
    pub missing: Vec<String>,
}

/// Outcome of [`CacheStore::set_bulk`]: which keys were written, and why the
/// others were not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSetResult {
    pub succeeded: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

impl BulkSetResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`CacheStore::remove_bulk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRemoveResult {
    pub removed: Vec<String>,
    pub not_found: Vec<String>,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize,
{
    // == Get Bulk ==
    /// Looks up every distinct key once, counting one hit or miss per key.
    ///
    /// An empty key makes the whole batch malformed.
    pub fn get_bulk<K: AsRef<str>>(&self, keys: &[K]) -> Result<BulkGetResult<V>> {
        let keys = distinct_keys(keys)?;
        let mut result = BulkGetResult {
            found: BTreeMap::new(),
            missing: Vec::new(),
        };

        for key in keys {
            match self.get(key) {
                Ok(value) => {
                    result.found.insert(key.to_string(), value);
                }
                Err(_) => result.missing.push(key.to_string()),
            }
        }
        Ok(result)
    }

    // == Set Bulk ==
    /// Writes each value independently with the same TTL.
    ///
    /// Per-key failures (invalid key, oversized value, capacity) are reported
    /// in `failed` while the remaining keys are still written. Only an
    /// invalid TTL, which would fail every key alike, rejects the batch.
    pub fn set_bulk<I>(&self, values: I, ttl: Option<u64>) -> Result<BulkSetResult>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        validate_ttl(ttl)?;
        let mut result = BulkSetResult::default();

        for (key, value) in values {
            match self.set(key.clone(), value, ttl) {
                Ok(()) => result.succeeded.push(key),
                Err(err) => {
                    result.failed.insert(key, err.to_string());
                }
            }
        }
        result.succeeded.sort();
        Ok(result)
    }

    // == Remove Bulk ==
    /// Removes every distinct key, splitting them into removed and absent.
    pub fn remove_bulk<K: AsRef<str>>(&self, keys: &[K]) -> Result<BulkRemoveResult> {
        let keys = distinct_keys(keys)?;
        let mut result = BulkRemoveResult::default();

        for key in keys {
            if self.remove(key)? {
                result.removed.push(key.to_string());
            } else {
                result.not_found.push(key.to_string());
            }
        }
        Ok(result)
    }
}

/// Validates and de-duplicates keys, keeping first-seen order.
fn distinct_keys<K: AsRef<str>>(keys: &[K]) -> Result<Vec<&str>> {
    let mut seen = HashSet::with_capacity(keys.len());
    let mut distinct = Vec::with_capacity(keys.len());

    for key in keys {
        let key = key.as_ref();
        validate_key(key).map_err(|err| match err {
            CacheError::InvalidArgument(reason) => {
                CacheError::InvalidArgument(format!("Malformed bulk request: {}", reason))
            }
            other => other,
        })?;
        if seen.insert(key) {
            distinct.push(key);
        }
    }
    Ok(distinct)
}
