use std::sync::Arc;

use grantry_core::AppResult;
use grantry_domain::ProvisioningState;

use crate::provisioning_ports::{
    ProvisioningStats, ProvisioningStatsCache, ProvisioningStatsRepository,
};
use crate::provisioning_state_service::ProvisioningStateService;

/// Read model for the health surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningStatusView {
    /// Current state; always read fresh.
    pub state: ProvisioningState,
    /// Grant and manual task counters; possibly cached.
    pub stats: ProvisioningStats,
}

/// Read-only provisioning status queries.
#[derive(Clone)]
pub struct ProvisioningStatusService {
    state_service: ProvisioningStateService,
    stats_repository: Arc<dyn ProvisioningStatsRepository>,
    stats_cache: Option<Arc<dyn ProvisioningStatsCache>>,
    stats_cache_ttl_seconds: u32,
}

impl ProvisioningStatusService {
    /// Creates a status service.
    #[must_use]
    pub fn new(
        state_service: ProvisioningStateService,
        stats_repository: Arc<dyn ProvisioningStatsRepository>,
    ) -> Self {
        Self {
            state_service,
            stats_repository,
            stats_cache: None,
            stats_cache_ttl_seconds: 0,
        }
    }

    /// Adds optional stats caching behavior.
    #[must_use]
    pub fn with_stats_cache(
        mut self,
        stats_cache: Arc<dyn ProvisioningStatsCache>,
        ttl_seconds: u32,
    ) -> Self {
        self.stats_cache = Some(stats_cache);
        self.stats_cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Returns state and stats, serving stats from cache when allowed.
    pub async fn status(&self, allow_cached_stats: bool) -> AppResult<ProvisioningStatusView> {
        let state = self.state_service.current_state().await?;
        let stats = if allow_cached_stats {
            self.cached_stats().await?
        } else {
            self.stats_repository.provisioning_stats().await?
        };

        Ok(ProvisioningStatusView { state, stats })
    }

    async fn cached_stats(&self) -> AppResult<ProvisioningStats> {
        if self.stats_cache_ttl_seconds > 0
            && let Some(cache) = &self.stats_cache
        {
            match cache.get_stats().await {
                Ok(Some(stats)) => return Ok(stats),
                Ok(None) => {}
                Err(error) => tracing::warn!(error = %error, "failed to read cached provisioning stats"),
            }
        }

        let stats = self.stats_repository.provisioning_stats().await?;

        if self.stats_cache_ttl_seconds > 0
            && let Some(cache) = &self.stats_cache
            && let Err(error) = cache
                .set_stats(stats, self.stats_cache_ttl_seconds)
                .await
        {
            tracing::warn!(error = %error, "failed to cache provisioning stats");
        }

        Ok(stats)
    }
}
