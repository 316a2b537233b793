//! Lifecycle events that drive background refreshes.
//!
//! The core never talks to a windowing system or network stack directly.
//! Instead it consumes a stream of [`LifecycleEvent`]s from an injected
//! [`EventSource`], so hosts wire up whatever "user came back" and "network
//! is up again" signals they have, and tests drive events deterministically.
//!
//! [`EventBus`] is the provided implementation: a cloneable broadcast
//! handle shared between the emitting side and any number of cores. Each
//! attached core holds one receiver, and receivers unregister themselves
//! when dropped, so wiring the same bus into several cores never multiplies
//! or leaks handlers.
//!
//! # Example
//!
//! ```
//! use querycore::events::{EventBus, LifecycleEvent};
//!
//! let bus = EventBus::new();
//!
//! // Attach cores with `QueryCore::with_event_source(config, &bus)`,
//! // then forward host signals:
//! bus.emit(LifecycleEvent::Online);
//! ```

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// An external signal that observed endpoints may be worth refreshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application's document became visible again.
    BecameVisible,
    /// The application window regained focus.
    FocusGained,
    /// Network connectivity returned.
    Online,
}

/// Source of lifecycle events for a core's refresh driver.
///
/// Implement this to bridge host-specific signals; [`EventBus`] covers the
/// common case of code that wants to push events by hand.
pub trait EventSource {
    /// Creates the stream of events this source produces.
    ///
    /// Called once per attached core.
    fn stream(&self) -> BoxStream<'static, LifecycleEvent>;
}

/// A broadcast-backed [`EventSource`] that emits events on demand.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Creates a bus with default buffering.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    /// Creates a bus buffering at most `capacity` undelivered events per
    /// receiver.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to every attached core.
    ///
    /// Returns the number of receivers the event reached; emitting with no
    /// cores attached is a no-op.
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of currently attached receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for EventBus {
    fn stream(&self) -> BoxStream<'static, LifecycleEvent> {
        let rx = self.sender.subscribe();
        BroadcastStream::new(rx)
            .filter_map(|result| async move { result.ok() })
            .boxed()
    }
}
