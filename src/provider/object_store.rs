use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use tracing::warn;

use super::{CacheEntry, CacheProvider};

/// Maximum size of the memory-mapped store.
const MAP_SIZE_BYTES: usize = 64 * 1024 * 1024;

/// Transactional object store backed by LMDB.
///
/// A single environment with one database holds every entry, keyed on the
/// namespaced key with the JSON-encoded entry as value. Reads run in read
/// transactions, writes commit their own write transaction.
///
/// The environment opens lazily on first use and the handle is memoized.
/// If the open fails (or no directory is configured) the store degrades to
/// a no-op: every `get` misses and `set`/`remove` succeed silently.
pub struct ObjectStore {
    path: Option<PathBuf>,
    handle: OnceLock<Option<StoreHandle>>,
}

struct StoreHandle {
    env: Env,
    db: Database<Str, Bytes>,
}

impl ObjectStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            handle: OnceLock::new(),
        }
    }

    /// A store with no backing directory; permanently degraded.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: None,
            handle: OnceLock::new(),
        }
    }

    fn handle(&self) -> Option<&StoreHandle> {
        self.handle.get_or_init(|| self.open()).as_ref()
    }

    fn open(&self) -> Option<StoreHandle> {
        let path = self.path.as_ref()?;
        if let Err(err) = std::fs::create_dir_all(path) {
            warn!(%err, path = %path.display(), "object store directory unavailable, degrading to no-op");
            return None;
        }

        let env = match unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE_BYTES)
                .max_dbs(1)
                .open(path)
        } {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, path = %path.display(), "object store open failed, degrading to no-op");
                return None;
            }
        };

        let mut wtxn = match env.write_txn() {
            Ok(wtxn) => wtxn,
            Err(err) => {
                warn!(%err, "object store setup transaction failed, degrading to no-op");
                return None;
            }
        };
        let db = match env.create_database::<Str, Bytes>(&mut wtxn, None) {
            Ok(db) => db,
            Err(err) => {
                warn!(%err, "object store database creation failed, degrading to no-op");
                return None;
            }
        };
        if let Err(err) = wtxn.commit() {
            warn!(%err, "object store setup commit failed, degrading to no-op");
            return None;
        }

        Some(StoreHandle { env, db })
    }
}

#[async_trait]
impl CacheProvider for ObjectStore {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let handle = self.handle()?;
        let rtxn = match handle.env.read_txn() {
            Ok(rtxn) => rtxn,
            Err(err) => {
                warn!(%key, %err, "object store read transaction failed, treating as miss");
                return None;
            }
        };
        let bytes = match handle.db.get(&rtxn, key) {
            Ok(bytes) => bytes?,
            Err(err) => {
                warn!(%key, %err, "object store read failed, treating as miss");
                return None;
            }
        };
        serde_json::from_slice(bytes).ok()
    }

    async fn set(&self, key: &str, entry: &CacheEntry) {
        let Some(handle) = self.handle() else {
            return;
        };
        let Ok(bytes) = serde_json::to_vec(entry) else {
            return;
        };
        let result = handle.env.write_txn().and_then(|mut wtxn| {
            handle.db.put(&mut wtxn, key, &bytes)?;
            wtxn.commit()
        });
        if let Err(err) = result {
            warn!(%key, %err, "object store write failed, dropping write");
        }
    }

    async fn remove(&self, key: &str) {
        let Some(handle) = self.handle() else {
            return;
        };
        let result = handle.env.write_txn().and_then(|mut wtxn| {
            handle.db.delete(&mut wtxn, key)?;
            wtxn.commit()
        });
        if let Err(err) = result {
            warn!(%key, %err, "object store remove failed");
        }
    }
}
