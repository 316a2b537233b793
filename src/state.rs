use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::QueryError;

/// The observable state of an endpoint.
///
/// This is the only structure subscribers ever see. Every notification and
/// every [`get_state`](crate::core::QueryCore::get_state) call delivers a
/// fully owned clone, so subscribers can mutate their copy freely without
/// affecting the core.
///
/// `data` and `last_updated` always travel together: `last_updated` is set
/// only when a production succeeded or a cached entry was hydrated, and a
/// failed production leaves both in place (stale-while-error).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointState<T> {
    /// The latest successfully produced value, if any.
    pub data: Option<T>,
    /// Milliseconds since the Unix epoch of the last success.
    pub last_updated: Option<u64>,
    /// Whether a production is currently in flight.
    pub is_loading: bool,
    /// The failure of the most recent production, cleared on success.
    pub error: Option<QueryError>,
}

impl<T> Default for EndpointState<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_updated: None,
            is_loading: false,
            error: None,
        }
    }
}

impl<T> EndpointState<T> {
    /// Returns `true` if the most recent production failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns `true` if a value is present.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether this state should be refreshed.
    ///
    /// Stale means: no data at all, or a staleness window is configured and
    /// the last success is at least that old.
    #[must_use]
    pub fn is_stale(&self, refetch_after: Option<Duration>, now_ms: u64) -> bool {
        if self.data.is_none() {
            return true;
        }
        match (refetch_after, self.last_updated) {
            (Some(window), Some(updated)) => {
                u128::from(now_ms.saturating_sub(updated)) >= window.as_millis()
            }
            _ => false,
        }
    }

    /// Production started. Data and error are preserved so subscribers can
    /// keep rendering the previous value while the refresh runs.
    pub(crate) fn begin_loading(&mut self) {
        self.is_loading = true;
    }

    /// Production succeeded: the new value replaces the old, the error is
    /// cleared.
    pub(crate) fn complete(&mut self, data: T, now_ms: u64) {
        self.data = Some(data);
        self.last_updated = Some(now_ms);
        self.is_loading = false;
        self.error = None;
    }

    /// Production failed: data and timestamp are retained.
    pub(crate) fn fail(&mut self, error: QueryError) {
        self.is_loading = false;
        self.error = Some(error);
    }

    /// Ends the loading phase without recording an outcome. Used when a
    /// production completes under a stale epoch and its result is discarded.
    pub(crate) fn end_loading(&mut self) {
        self.is_loading = false;
    }

    /// Back to the empty initial state. `still_loading` keeps the loading
    /// flag truthful when a production is still in flight at reset time.
    pub(crate) fn reset(&mut self, still_loading: bool) {
        self.data = None;
        self.last_updated = None;
        self.is_loading = still_loading;
        self.error = None;
    }

    /// Fills the state from a cached entry.
    pub(crate) fn hydrate(&mut self, data: T, last_updated: u64) {
        self.data = Some(data);
        self.last_updated = Some(last_updated);
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
