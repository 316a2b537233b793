use std::path::PathBuf;
use std::time::Duration;

/// Selects the persistence backend for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Process-memory map; entries are lost at exit.
    #[default]
    Memory,
    /// One JSON text file per entry under the core's data directory.
    LocalKv,
    /// Transactional LMDB object store under the core's data directory.
    ObjectStore,
}

/// Configuration for a [`QueryCore`](crate::core::QueryCore) instance.
///
/// Per-endpoint [`EndpointOptions`] override these defaults.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    /// Default persistence backend for endpoints that don't pick their own.
    pub cache_provider: ProviderKind,

    /// Default staleness window.
    ///
    /// While data is younger than this, subscribing and lifecycle events
    /// leave it alone. Once the window has elapsed, a refetch is scheduled
    /// in the background while the cached value keeps being served.
    /// `None` disables automatic staleness entirely.
    pub default_refetch_after: Option<Duration>,

    /// Directory backing the filesystem providers.
    ///
    /// [`ProviderKind::LocalKv`] and [`ProviderKind::ObjectStore`] degrade
    /// to no-ops when this is unset.
    pub data_dir: Option<PathBuf>,
}

impl CoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cache_provider(mut self, kind: ProviderKind) -> Self {
        self.cache_provider = kind;
        self
    }

    #[must_use]
    pub fn with_default_refetch_after(mut self, window: Duration) -> Self {
        self.default_refetch_after = Some(window);
        self
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}

/// Per-endpoint options, merged over the core defaults at definition time.
#[derive(Debug, Clone, Default)]
pub struct EndpointOptions {
    /// Persistence backend for this endpoint. Falls back to the core default.
    pub cache_provider: Option<ProviderKind>,

    /// Staleness window for this endpoint. Falls back to the core default.
    pub refetch_after: Option<Duration>,
}

impl EndpointOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cache_provider(mut self, kind: ProviderKind) -> Self {
        self.cache_provider = Some(kind);
        self
    }

    #[must_use]
    pub fn with_refetch_after(mut self, window: Duration) -> Self {
        self.refetch_after = Some(window);
        self
    }

    /// Merges these options over the core defaults; per-endpoint values win.
    pub(crate) fn merged_over(&self, config: &CoreConfig) -> ResolvedOptions {
        ResolvedOptions {
            provider: self.cache_provider.unwrap_or(config.cache_provider),
            refetch_after: self.refetch_after.or(config.default_refetch_after),
        }
    }
}

/// Fully merged options held by an endpoint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedOptions {
    pub provider: ProviderKind,
    pub refetch_after: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.cache_provider, ProviderKind::Memory);
        assert_eq!(config.default_refetch_after, None);
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn test_builder_style_config() {
        let config = CoreConfig::new()
            .with_cache_provider(ProviderKind::LocalKv)
            .with_default_refetch_after(Duration::from_secs(30))
            .with_data_dir("/tmp/querycore");
        assert_eq!(config.cache_provider, ProviderKind::LocalKv);
        assert_eq!(config.default_refetch_after, Some(Duration::from_secs(30)));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/querycore")));
    }

    #[test]
    fn test_merge_uses_core_defaults() {
        let config = CoreConfig::new()
            .with_cache_provider(ProviderKind::ObjectStore)
            .with_default_refetch_after(Duration::from_secs(60));

        let resolved = EndpointOptions::new().merged_over(&config);
        assert_eq!(resolved.provider, ProviderKind::ObjectStore);
        assert_eq!(resolved.refetch_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_merge_endpoint_options_win() {
        let config = CoreConfig::new()
            .with_cache_provider(ProviderKind::ObjectStore)
            .with_default_refetch_after(Duration::from_secs(60));

        let resolved = EndpointOptions::new()
            .with_cache_provider(ProviderKind::Memory)
            .with_refetch_after(Duration::from_millis(100))
            .merged_over(&config);
        assert_eq!(resolved.provider, ProviderKind::Memory);
        assert_eq!(resolved.refetch_after, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_merge_without_any_window() {
        let resolved = EndpointOptions::new().merged_over(&CoreConfig::default());
        assert_eq!(resolved.provider, ProviderKind::Memory);
        assert_eq!(resolved.refetch_after, None);
    }
}
