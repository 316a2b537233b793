//! # QueryCore - Data Fetching and Caching Core
//!
//! QueryCore is a headless data-fetching and caching layer, similar to SWR
//! or TanStack Query. Applications register *endpoints* - keyed async
//! producer functions - and the core keeps one source of truth per key:
//! the latest value, whether a fetch is in flight, the last error and the
//! time of the last success. Subscribers receive a cloned state snapshot
//! on every transition.
//!
//! ## Core Components
//!
//! - [`QueryCore`](crate::core::QueryCore): the facade - define, read, observe,
//!   refresh and invalidate endpoints
//! - [`EndpointState`](crate::state::EndpointState): the observable state of an
//!   endpoint
//! - [`CacheProvider`](crate::provider::CacheProvider): pluggable persistence
//!   (in-memory, JSON files, LMDB object store)
//! - [`EventBus`](crate::events::EventBus): injected focus/visibility/online
//!   signals that drive background refreshes
//!
//! ## Behavior
//!
//! 1. Defining an endpoint hydrates its state from the cache, without
//!    fetching
//! 2. Subscribing delivers the current snapshot immediately; missing or
//!    stale data triggers a background refetch
//! 3. Concurrent refetches of one endpoint coalesce into a single
//!    producer invocation
//! 4. A failed fetch keeps the previous value and exposes the error
//!    alongside it (stale-while-error)
//! 5. Lifecycle events refresh observed endpoints: focus and visibility
//!    refresh the stale ones, reconnection refreshes all of them
//!
//! ## Example
//!
//! ```rust,no_run
//! use querycore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     let bus = EventBus::new();
//!     let core = QueryCore::with_event_source(CoreConfig::default(), &bus);
//!
//!     core.define_endpoint(
//!         "counter",
//!         || async { Ok(41u32 + 1) },
//!         EndpointOptions::default(),
//!     )
//!     .await?;
//!
//!     let subscription = core.subscribe("counter", |state: EndpointState<u32>| {
//!         println!("loading={} data={:?}", state.is_loading, state.data);
//!     })?;
//!
//!     core.refetch("counter")?.await;
//!
//!     // Host signals drive staleness refreshes for observed endpoints.
//!     bus.emit(LifecycleEvent::Online);
//!
//!     subscription.unsubscribe();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod prelude;
pub mod provider;
pub mod state;

// Re-export commonly used types
pub use config::{CoreConfig, EndpointOptions, ProviderKind};
pub use core::QueryCore;
pub use endpoint::{QueryValue, RefetchFuture, SubscriptionHandle};
pub use error::QueryError;
pub use events::{EventBus, EventSource, LifecycleEvent};
pub use state::EndpointState;
