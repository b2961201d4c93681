use std::time::{Duration, Instant};

use async_trait::async_trait;
use grantry_application::{ProvisioningStats, ProvisioningStatsCache};
use grantry_core::AppResult;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct StatsCacheEntry {
    stats: ProvisioningStats,
    expires_at: Instant,
}

/// In-memory cache adapter for provisioning stats, used when Redis is not
/// configured.
#[derive(Default)]
pub struct InMemoryProvisioningStatsCache {
    entry: RwLock<Option<StatsCacheEntry>>,
}

impl InMemoryProvisioningStatsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProvisioningStatsCache for InMemoryProvisioningStatsCache {
    async fn get_stats(&self) -> AppResult<Option<ProvisioningStats>> {
        {
            let entry = self.entry.read().await;
            match entry.as_ref() {
                Some(entry) if entry.expires_at > Instant::now() => return Ok(Some(entry.stats)),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entry = self.entry.write().await;
        if entry
            .as_ref()
            .is_some_and(|cached| cached.expires_at <= Instant::now())
        {
            *entry = None;
        }

        Ok(None)
    }

    async fn set_stats(&self, stats: ProvisioningStats, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        *self.entry.write().await = Some(StatsCacheEntry { stats, expires_at });

        Ok(())
    }
}
