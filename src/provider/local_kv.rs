use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use super::{CacheEntry, CacheProvider};

/// File-backed key/value provider.
///
/// Each entry is one UTF-8 text file under the configured directory,
/// named after the namespaced key and containing the JSON serialization
/// of the entry. The backend itself is synchronous filesystem IO wrapped
/// in the async provider contract.
///
/// Quota, permission and serialization errors are swallowed: a failed
/// read is a miss, a failed write leaves the previous file in place.
/// Without a directory the store is a no-op.
#[derive(Debug)]
pub struct LocalKvStore {
    dir: Option<PathBuf>,
}

impl LocalKvStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A store with no backing directory; every read misses and every
    /// write succeeds silently.
    #[must_use]
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(sanitize(key)))
    }
}

/// Maps a storage key onto a portable file name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[async_trait]
impl CacheProvider for LocalKvStore {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(%key, %err, "local kv read failed, treating as miss");
                }
                return None;
            }
        };
        serde_json::from_str(&text).ok()
    }

    async fn set(&self, key: &str, entry: &CacheEntry) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let Ok(text) = serde_json::to_string(entry) else {
            return;
        };
        if let Some(dir) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(dir) {
                warn!(%key, %err, "local kv directory unavailable, dropping write");
                return;
            }
        }
        if let Err(err) = std::fs::write(&path, text) {
            warn!(%key, %err, "local kv write failed, dropping write");
        }
    }

    async fn remove(&self, key: &str) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(%key, %err, "local kv remove failed");
            }
        }
    }
}
