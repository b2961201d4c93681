use std::sync::Arc;

use grantry_application::ProvisioningStatsCache;
use grantry_infrastructure::{InMemoryProvisioningStatsCache, RedisProvisioningStatsCache};

pub(super) fn build_provisioning_stats_cache(
    redis_client: Option<redis::Client>,
) -> Arc<dyn ProvisioningStatsCache> {
    match redis_client {
        Some(redis_client) => Arc::new(RedisProvisioningStatsCache::new(redis_client, "grantry")),
        None => Arc::new(InMemoryProvisioningStatsCache::new()),
    }
}
