//! The facade: endpoint registry and public operations.
//!
//! [`QueryCore`] keeps one record per endpoint key and is the single entry
//! point for defining, reading, observing and refreshing endpoints. All
//! methods that take a key fail fast with
//! [`QueryError::UnknownEndpoint`] / [`QueryError::TypeMismatch`] on
//! usage errors; producer failures never surface as method errors, only
//! through the endpoint state.
//!
//! # Example
//!
//! ```rust,no_run
//! use querycore::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     id: u32,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     let core = QueryCore::new(CoreConfig::default());
//!
//!     core.define_endpoint(
//!         "user",
//!         || async {
//!             Ok(User {
//!                 id: 1,
//!                 name: "A".to_string(),
//!             })
//!         },
//!         EndpointOptions::default(),
//!     )
//!     .await?;
//!
//!     let subscription = core.subscribe("user", |state: EndpointState<User>| {
//!         if let Some(user) = &state.data {
//!             println!("user is now {}", user.name);
//!         }
//!     })?;
//!
//!     core.refetch("user")?.await;
//!     assert!(core.get_state::<User>("user")?.data.is_some());
//!
//!     subscription.unsubscribe();
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{CoreConfig, EndpointOptions, ProviderKind};
use crate::endpoint::{
    Endpoint, ErasedEndpoint, Listener, Producer, QueryValue, RefetchFuture, SubscriptionHandle,
};
use crate::error::QueryError;
use crate::events::{EventSource, LifecycleEvent};
use crate::provider::{CacheProvider, LocalKvStore, MemoryStore, ObjectStore};
use crate::state::{EndpointState, now_millis};

/// Subdirectory of the data directory holding the LMDB environment.
const OBJECT_STORE_DIR: &str = "object-store";

/// The data-fetching and caching core.
///
/// One instance owns its endpoint registry and its provider instances.
/// Records are created by [`define_endpoint`](Self::define_endpoint) and
/// live for the lifetime of the core; [`invalidate`](Self::invalidate)
/// clears their state but keeps them functional.
///
/// Refetching, subscribing to a stale endpoint and attaching an event
/// source all spawn background work, so those calls must run inside a
/// Tokio runtime.
pub struct QueryCore {
    inner: Arc<CoreInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct CoreInner {
    config: CoreConfig,
    registry: DashMap<String, Arc<dyn ErasedEndpoint>>,
    providers: ProviderSet,
}

impl QueryCore {
    /// Creates a core without lifecycle refresh wiring.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        let providers = ProviderSet::new(config.data_dir.clone());
        Self {
            inner: Arc::new(CoreInner {
                config,
                registry: DashMap::new(),
                providers,
            }),
            driver: Mutex::new(None),
        }
    }

    /// Creates a core and attaches `source` for focus/visibility/online
    /// driven refreshes.
    #[must_use]
    pub fn with_event_source(config: CoreConfig, source: &dyn EventSource) -> Self {
        let core = Self::new(config);
        core.attach_event_source(source);
        core
    }

    /// Consumes lifecycle events from `source` until the core is dropped.
    ///
    /// Attaching a source replaces a previously attached one. Several
    /// cores may attach to the same source; each holds its own stream and
    /// detaches it when dropped.
    pub fn attach_event_source(&self, source: &dyn EventSource) {
        let mut stream = source.stream();
        let inner = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.handle_event(event);
            }
        });
        if let Some(previous) = self.driver.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Installs (or updates) the endpoint under `key`.
    ///
    /// Options are merged over the core defaults, the cache binding is
    /// resolved, and one cache hydration is attempted; a valid cached
    /// entry fills an empty state with `data` and `last_updated`. No
    /// production is triggered.
    ///
    /// Redefining an existing key is not an error: producer, options and
    /// cache binding are replaced while in-memory state and listeners are
    /// preserved. Redefining with a different value type replaces the
    /// whole record, state included.
    pub async fn define_endpoint<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: EndpointOptions,
    ) -> Result<(), QueryError>
    where
        T: QueryValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let producer: Producer<T> = Arc::new(move || producer().boxed());
        let resolved = options.merged_over(&self.inner.config);
        let cache = self.inner.providers.resolve(resolved.provider);

        let existing: Option<Arc<Endpoint<T>>> = self.inner.registry.get(key).and_then(|entry| {
            entry
                .value()
                .as_any()
                .downcast_ref::<Arc<Endpoint<T>>>()
                .map(Arc::clone)
        });

        let endpoint = match existing {
            Some(endpoint) => {
                endpoint.rebind(producer, resolved, cache);
                endpoint
            }
            None => {
                let endpoint = Endpoint::new(key.to_string(), producer, resolved, cache);
                self.inner
                    .registry
                    .insert(key.to_string(), Arc::new(Arc::clone(&endpoint)));
                debug!(endpoint = %key, "endpoint defined");
                endpoint
            }
        };

        endpoint.hydrate().await;
        Ok(())
    }

    /// Returns a deep clone of the endpoint's current state.
    pub fn get_state<T: QueryValue>(&self, key: &str) -> Result<EndpointState<T>, QueryError> {
        Ok(self.inner.typed::<T>(key)?.snapshot())
    }

    /// Refreshes the endpoint, coalescing with any production already in
    /// flight.
    ///
    /// The loading transition and its notification happen synchronously
    /// inside this call. The returned future completes when the
    /// production settles and always resolves; failures surface through
    /// the endpoint state. Dropping the future does not cancel the
    /// production.
    pub fn refetch(&self, key: &str) -> Result<RefetchFuture, QueryError> {
        Ok(self.inner.erased(key)?.refetch_erased())
    }

    /// Clears the endpoint's state and cache entry, then notifies
    /// subscribers. The record stays defined; no refetch is triggered.
    pub async fn invalidate(&self, key: &str) -> Result<(), QueryError> {
        self.inner.erased(key)?.invalidate_erased().await;
        Ok(())
    }

    /// Attaches `listener` to the endpoint.
    ///
    /// The listener synchronously receives the current snapshot exactly
    /// once before this method returns. If the endpoint has no data or
    /// its data is stale, a refetch is scheduled on the runtime, so the
    /// loading notification arrives as a separate, later delivery.
    pub fn subscribe<T, L>(&self, key: &str, listener: L) -> Result<SubscriptionHandle, QueryError>
    where
        T: QueryValue,
        L: Fn(EndpointState<T>) + Send + Sync + 'static,
    {
        let endpoint = self.inner.typed::<T>(key)?;
        let listener: Listener<T> = Arc::new(listener);
        let (id, snapshot) = endpoint.add_listener(Arc::clone(&listener));
        listener(snapshot.clone());

        if snapshot.is_stale(endpoint.refetch_after(), now_millis()) {
            let stale = Arc::clone(&endpoint);
            tokio::spawn(async move {
                stale.refetch().await;
            });
        }

        Ok(SubscriptionHandle::new(move || {
            endpoint.remove_listener(id);
        }))
    }
}

impl Drop for QueryCore {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl CoreInner {
    fn erased(&self, key: &str) -> Result<Arc<dyn ErasedEndpoint>, QueryError> {
        self.registry
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| QueryError::UnknownEndpoint(key.to_string()))
    }

    fn typed<T: QueryValue>(&self, key: &str) -> Result<Arc<Endpoint<T>>, QueryError> {
        let erased = self.erased(key)?;
        erased
            .as_any()
            .downcast_ref::<Arc<Endpoint<T>>>()
            .map(Arc::clone)
            .ok_or_else(|| QueryError::TypeMismatch(key.to_string()))
    }

    /// Applies a lifecycle event to every observed endpoint.
    ///
    /// Focus and visibility refresh stale endpoints that opted into a
    /// staleness window; reconnection refreshes every observed endpoint.
    /// Unobserved endpoints are never touched.
    fn handle_event(&self, event: LifecycleEvent) {
        let now = now_millis();
        let mut due: Vec<Arc<dyn ErasedEndpoint>> = Vec::new();
        for entry in self.registry.iter() {
            let endpoint = entry.value();
            if !endpoint.is_observed() {
                continue;
            }
            let refresh = match event {
                LifecycleEvent::BecameVisible | LifecycleEvent::FocusGained => {
                    endpoint.refetch_after().is_some() && endpoint.is_stale(now)
                }
                LifecycleEvent::Online => true,
            };
            if refresh {
                due.push(Arc::clone(endpoint));
            }
        }
        for endpoint in due {
            debug!(endpoint = endpoint.key(), ?event, "lifecycle refresh");
            let _ = endpoint.refetch_erased();
        }
    }
}

/// Provider instances, created lazily and shared by every endpoint of the
/// core that selects the same kind.
struct ProviderSet {
    data_dir: Option<PathBuf>,
    memory: OnceLock<Arc<MemoryStore>>,
    local_kv: OnceLock<Arc<LocalKvStore>>,
    object_store: OnceLock<Arc<ObjectStore>>,
}

impl ProviderSet {
    fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            memory: OnceLock::new(),
            local_kv: OnceLock::new(),
            object_store: OnceLock::new(),
        }
    }

    fn resolve(&self, kind: ProviderKind) -> Arc<dyn CacheProvider> {
        match kind {
            ProviderKind::Memory => {
                let store = self.memory.get_or_init(|| Arc::new(MemoryStore::new()));
                Arc::clone(store) as Arc<dyn CacheProvider>
            }
            ProviderKind::LocalKv => {
                let store = self.local_kv.get_or_init(|| {
                    Arc::new(match &self.data_dir {
                        Some(dir) => LocalKvStore::new(dir),
                        None => LocalKvStore::disabled(),
                    })
                });
                Arc::clone(store) as Arc<dyn CacheProvider>
            }
            ProviderKind::ObjectStore => {
                let store = self.object_store.get_or_init(|| {
                    Arc::new(match &self.data_dir {
                        Some(dir) => ObjectStore::new(dir.join(OBJECT_STORE_DIR)),
                        None => ObjectStore::disabled(),
                    })
                });
                Arc::clone(store) as Arc<dyn CacheProvider>
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_define_initializes_empty_state() {
        let core = QueryCore::new(CoreConfig::default());
        core.define_endpoint("n", || async { Ok(1u32) }, EndpointOptions::default())
            .await
            .unwrap();

        let state = core.get_state::<u32>("n").unwrap();
        assert_eq!(state.data, None);
        assert_eq!(state.last_updated, None);
        assert!(!state.is_loading);
        assert!(!state.is_error());
    }

    #[tokio::test]
    async fn test_unknown_key_fails_fast() {
        let core = QueryCore::new(CoreConfig::default());

        assert_eq!(
            core.get_state::<u32>("missing").unwrap_err(),
            QueryError::UnknownEndpoint("missing".to_string())
        );
        assert!(matches!(
            core.refetch("missing").err(),
            Some(QueryError::UnknownEndpoint(_))
        ));
        assert!(matches!(
            core.invalidate("missing").await.unwrap_err(),
            QueryError::UnknownEndpoint(_)
        ));
        assert!(matches!(
            core.subscribe("missing", |_: EndpointState<u32>| {}).unwrap_err(),
            QueryError::UnknownEndpoint(_)
        ));
    }

    #[tokio::test]
    async fn test_wrong_value_type_fails_fast() {
        let core = QueryCore::new(CoreConfig::default());
        core.define_endpoint("n", || async { Ok(1u32) }, EndpointOptions::default())
            .await
            .unwrap();

        assert_eq!(
            core.get_state::<String>("n").unwrap_err(),
            QueryError::TypeMismatch("n".to_string())
        );
    }

    #[tokio::test]
    async fn test_redefinition_preserves_state() {
        let core = QueryCore::new(CoreConfig::default());
        core.define_endpoint("n", || async { Ok(1u32) }, EndpointOptions::default())
            .await
            .unwrap();
        core.refetch("n").unwrap().await;
        assert_eq!(core.get_state::<u32>("n").unwrap().data, Some(1));

        core.define_endpoint("n", || async { Ok(2u32) }, EndpointOptions::default())
            .await
            .unwrap();
        assert_eq!(core.get_state::<u32>("n").unwrap().data, Some(1));

        core.refetch("n").unwrap().await;
        assert_eq!(core.get_state::<u32>("n").unwrap().data, Some(2));
    }

    #[tokio::test]
    async fn test_redefinition_with_new_type_replaces_record() {
        let core = QueryCore::new(CoreConfig::default());
        core.define_endpoint("n", || async { Ok(1u32) }, EndpointOptions::default())
            .await
            .unwrap();
        core.refetch("n").unwrap().await;

        core.define_endpoint(
            "n",
            || async { Ok("two".to_string()) },
            EndpointOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(core.get_state::<String>("n").unwrap().data, None);
        assert!(matches!(
            core.get_state::<u32>("n").unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
    }

    #[tokio::test]
    async fn test_refetch_error_never_escapes_the_future() {
        let core = QueryCore::new(CoreConfig::default());
        core.define_endpoint(
            "n",
            || async { Err::<u32, _>(QueryError::fetch("boom")) },
            EndpointOptions::default(),
        )
        .await
        .unwrap();

        // Resolves despite the failure.
        core.refetch("n").unwrap().await;

        let state = core.get_state::<u32>("n").unwrap();
        assert!(state.is_error());
        assert_eq!(state.error, Some(QueryError::Fetch("boom".to_string())));
    }
}
