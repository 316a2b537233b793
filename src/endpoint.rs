//! Endpoint records: one per defined key, never removed.
//!
//! An [`Endpoint`] owns everything keyed state needs: the producer, the
//! merged options, the resolved cache binding, the observable state, the
//! listener set and the in-flight share. The registry stores endpoints
//! behind the type-erased [`ErasedEndpoint`] trait so the facade and the
//! refresh driver can work across heterogeneous value types; typed
//! operations downcast back through `as_any`.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::config::ResolvedOptions;
use crate::error::QueryError;
use crate::provider::{CacheEntry, CacheProvider, cache_key};
use crate::state::{EndpointState, now_millis};

/// Marker for types an endpoint can produce.
///
/// Blanket-implemented; `Clone` backs snapshot delivery, the serde bounds
/// back cache persistence.
pub trait QueryValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> QueryValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The nullary async function producing an endpoint's value.
pub type Producer<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

/// A callback receiving state snapshots.
pub type Listener<T> = Arc<dyn Fn(EndpointState<T>) + Send + Sync>;

/// The future shared between every caller of a coalesced refetch.
///
/// Always resolves; producer failures surface through the endpoint state.
pub type RefetchFuture = Shared<BoxFuture<'static, ()>>;

/// Producer, merged options and cache binding; swapped wholesale when an
/// existing key is redefined.
pub(crate) struct Binding<T> {
    pub producer: Producer<T>,
    pub options: ResolvedOptions,
    pub cache: Arc<dyn CacheProvider>,
}

/// A single endpoint record.
///
/// Lock order where two are held together: `in_flight` before `state`.
/// Listener callbacks always run with no locks held.
pub(crate) struct Endpoint<T: QueryValue> {
    key: String,
    binding: Mutex<Binding<T>>,
    state: Mutex<EndpointState<T>>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_listener_id: AtomicU64,
    in_flight: Mutex<Option<RefetchFuture>>,
    /// Bumped by invalidation; productions that finish under an older
    /// epoch discard their outcome.
    epoch: AtomicU64,
}

impl<T: QueryValue> Endpoint<T> {
    pub(crate) fn new(
        key: String,
        producer: Producer<T>,
        options: ResolvedOptions,
        cache: Arc<dyn CacheProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            binding: Mutex::new(Binding {
                producer,
                options,
                cache,
            }),
            state: Mutex::new(EndpointState::default()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            epoch: AtomicU64::new(0),
        })
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Replaces producer, options and cache binding, keeping state,
    /// listeners and the in-flight share untouched.
    pub(crate) fn rebind(
        &self,
        producer: Producer<T>,
        options: ResolvedOptions,
        cache: Arc<dyn CacheProvider>,
    ) {
        let mut binding = self.binding.lock().unwrap();
        *binding = Binding {
            producer,
            options,
            cache,
        };
    }

    pub(crate) fn refetch_after(&self) -> Option<Duration> {
        self.binding.lock().unwrap().options.refetch_after
    }

    fn cache(&self) -> Arc<dyn CacheProvider> {
        Arc::clone(&self.binding.lock().unwrap().cache)
    }

    /// Loads the cached entry into an empty state. Invalid or mismatched
    /// entries count as misses. No notification: hydration happens inside
    /// `define_endpoint`, before the loading/success protocol starts.
    pub(crate) async fn hydrate(&self) {
        if self.state.lock().unwrap().has_data() {
            return;
        }
        let Some(entry) = self.cache().get(&cache_key(&self.key)).await else {
            return;
        };
        let Some(data) = entry.decode::<T>() else {
            debug!(endpoint = %self.key, "cached entry has a different shape, ignoring");
            return;
        };
        let mut state = self.state.lock().unwrap();
        // A production may have landed while the cache read was in flight.
        if !state.has_data() {
            state.hydrate(data, entry.last_updated);
        }
    }

    /// Current state, deep-cloned.
    pub(crate) fn snapshot(&self) -> EndpointState<T> {
        self.state.lock().unwrap().clone()
    }

    pub(crate) fn is_observed(&self) -> bool {
        !self.listeners.lock().unwrap().is_empty()
    }

    pub(crate) fn is_stale(&self, now_ms: u64) -> bool {
        let refetch_after = self.refetch_after();
        self.state.lock().unwrap().is_stale(refetch_after, now_ms)
    }

    /// Adds a listener and returns its id together with the snapshot to
    /// deliver to it.
    pub(crate) fn add_listener(&self, listener: Listener<T>) -> (u64, EndpointState<T>) {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, listener));
        (id, self.snapshot())
    }

    /// Removes a listener by id; unknown ids are a no-op.
    pub(crate) fn remove_listener(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(listener_id, _)| *listener_id != id);
    }

    /// Delivers the current snapshot to every listener registered right
    /// now, in insertion order. A panicking listener is contained and the
    /// iteration continues.
    pub(crate) fn notify(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        trace!(endpoint = %self.key, listeners = listeners.len(), "notifying");
        for listener in listeners {
            let state = snapshot.clone();
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                warn!(endpoint = %self.key, "listener panicked during notification");
            }
        }
    }

    /// Starts a production, or joins the one already in flight.
    ///
    /// The loading transition and its notification complete synchronously
    /// inside this call; the returned share is also spawned so it makes
    /// progress without a waiting caller. Must run inside a Tokio runtime.
    pub(crate) fn refetch(self: Arc<Self>) -> RefetchFuture {
        let share = {
            let mut in_flight = self.in_flight.lock().unwrap();
            if let Some(share) = in_flight.as_ref() {
                trace!(endpoint = %self.key, "joining in-flight production");
                return share.clone();
            }

            let epoch = self.epoch.load(Ordering::Acquire);
            let (producer, cache) = {
                let binding = self.binding.lock().unwrap();
                (Arc::clone(&binding.producer), Arc::clone(&binding.cache))
            };
            let this = Arc::clone(&self);
            let share: RefetchFuture = async move {
                let outcome = producer().await;
                this.finish(epoch, outcome, cache).await;
            }
            .boxed()
            .shared();

            *in_flight = Some(share.clone());
            self.state.lock().unwrap().begin_loading();
            share
        };

        debug!(endpoint = %self.key, "production started");
        self.notify();
        tokio::spawn(share.clone());
        share
    }

    /// Completion half of a production: one synchronous section applies
    /// the transition and clears the in-flight slot, then the cache write
    /// (success only) and the notification follow.
    async fn finish(
        &self,
        epoch: u64,
        outcome: Result<T, QueryError>,
        cache: Arc<dyn CacheProvider>,
    ) {
        let fresh = self.epoch.load(Ordering::Acquire) == epoch;
        let entry = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let mut state = self.state.lock().unwrap();
            *in_flight = None;
            if !fresh {
                debug!(endpoint = %self.key, "production outlived invalidation, discarding result");
                state.end_loading();
                None
            } else {
                match outcome {
                    Ok(data) => {
                        let now = now_millis();
                        let entry = CacheEntry::encode(&data, now);
                        state.complete(data, now);
                        entry
                    }
                    Err(error) => {
                        debug!(endpoint = %self.key, %error, "production failed");
                        state.fail(error);
                        None
                    }
                }
            }
        };

        if let Some(entry) = entry {
            cache.set(&cache_key(&self.key), &entry).await;
        }
        self.notify();
    }

    /// Clears cache and state, bumps the epoch so an in-flight production
    /// cannot resurrect the old value.
    pub(crate) async fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache().remove(&cache_key(&self.key)).await;
        {
            let in_flight = self.in_flight.lock().unwrap();
            let mut state = self.state.lock().unwrap();
            state.reset(in_flight.is_some());
        }
        debug!(endpoint = %self.key, "invalidated");
        self.notify();
    }
}

/// Capabilities the registry needs without knowing the value type.
pub(crate) trait ErasedEndpoint: Send + Sync {
    fn key(&self) -> &str;
    fn is_observed(&self) -> bool;
    fn refetch_after(&self) -> Option<Duration>;
    fn is_stale(&self, now_ms: u64) -> bool;
    fn refetch_erased(&self) -> RefetchFuture;
    fn invalidate_erased(&self) -> BoxFuture<'static, ()>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: QueryValue> ErasedEndpoint for Arc<Endpoint<T>> {
    fn key(&self) -> &str {
        Endpoint::key(self)
    }

    fn is_observed(&self) -> bool {
        Endpoint::is_observed(self)
    }

    fn refetch_after(&self) -> Option<Duration> {
        Endpoint::refetch_after(self)
    }

    fn is_stale(&self, now_ms: u64) -> bool {
        Endpoint::is_stale(self, now_ms)
    }

    fn refetch_erased(&self) -> RefetchFuture {
        Arc::clone(self).refetch()
    }

    fn invalidate_erased(&self) -> BoxFuture<'static, ()> {
        let this = Arc::clone(self);
        async move { this.invalidate().await }.boxed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Detaches a listener from its endpoint.
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is a no-op;
/// dropping the handle without calling it leaves the listener attached.
pub struct SubscriptionHandle {
    detach: Box<dyn Fn() + Send + Sync>,
}

impl SubscriptionHandle {
    pub(crate) fn new(detach: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            detach: Box::new(detach),
        }
    }

    /// Removes the listener from the endpoint's set.
    pub fn unsubscribe(&self) {
        (self.detach)();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle").finish_non_exhaustive()
    }
}
