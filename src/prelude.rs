//! Prelude module for convenient imports.
//!
//! ```
//! use querycore::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`QueryCore`] - The facade over the endpoint registry
//! - [`CoreConfig`] / [`EndpointOptions`] / [`ProviderKind`] - Configuration
//! - [`EndpointState`] - The observable state of an endpoint
//! - [`QueryError`] - The crate error type
//! - [`EventBus`] / [`LifecycleEvent`] - Lifecycle-driven refreshes
//! - [`SubscriptionHandle`] - Detaching a listener

pub use crate::config::{CoreConfig, EndpointOptions, ProviderKind};
pub use crate::core::QueryCore;
pub use crate::endpoint::SubscriptionHandle;
pub use crate::error::QueryError;
pub use crate::events::{EventBus, EventSource, LifecycleEvent};
pub use crate::state::EndpointState;
