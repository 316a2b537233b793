//! Pluggable persistence for endpoint values.
//!
//! A [`CacheProvider`] stores `{data, lastUpdated}` entries by namespaced
//! key. Three backends are provided:
//!
//! - [`MemoryStore`]: a process-memory map, lost at exit
//! - [`LocalKvStore`]: one JSON text file per entry
//! - [`ObjectStore`]: a transactional LMDB database
//!
//! The cache is an optimization, never the source of truth: every method
//! fails soft. A backend error turns `get` into a miss and makes `set` and
//! `remove` silently succeed, with a diagnostic on the `tracing` output.
//! Callers never have to handle provider errors.

mod local_kv;
mod memory;
mod object_store;

pub use local_kv::LocalKvStore;
pub use memory::MemoryStore;
pub use object_store::ObjectStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Namespace prefix for every key a provider stores.
pub const CACHE_PREFIX: &str = "QueryCore_";

/// Returns the namespaced storage key for an endpoint key.
#[must_use]
pub fn cache_key(endpoint_key: &str) -> String {
    format!("{CACHE_PREFIX}{endpoint_key}")
}

/// The persisted shape of a cached value.
///
/// Serialized as `{"data": ..., "lastUpdated": ...}`. Unknown top-level
/// fields in a stored entry are ignored on read; an entry missing `data`
/// or with a non-numeric `lastUpdated` fails deserialization and is
/// treated as a cache miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    #[serde(rename = "lastUpdated")]
    pub last_updated: u64,
}

impl CacheEntry {
    /// Builds an entry from a serializable value.
    ///
    /// Returns `None` when the value cannot be represented as JSON; the
    /// caller skips the cache write in that case.
    pub fn encode<T: Serialize>(data: &T, last_updated: u64) -> Option<Self> {
        match serde_json::to_value(data) {
            Ok(data) => Some(Self { data, last_updated }),
            Err(err) => {
                tracing::warn!(%err, "value not representable as JSON, skipping cache write");
                None
            }
        }
    }

    /// Decodes the stored value back into its concrete type.
    ///
    /// A shape mismatch is a cache miss, not an error.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Storage backend for cache entries.
///
/// All methods are asynchronous even for synchronous backends, so the rest
/// of the core is written against one contract. Implementations must fail
/// soft: no method surfaces a backend error to the caller.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Fetches the entry stored under `key`, or `None` on miss or backend
    /// failure.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Stores `entry` under `key`. Backend failures are swallowed.
    async fn set(&self, key: &str, entry: &CacheEntry);

    /// Removes the entry under `key`. Backend failures are swallowed.
    async fn remove(&self, key: &str);
}
