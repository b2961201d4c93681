use async_trait::async_trait;
use grantry_core::AppResult;
use serde::{Deserialize, Serialize};

/// Grant and manual task counters for the health surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningStats {
    /// PENDING grants.
    pub pending: u64,
    /// FAILED grants.
    pub failed: u64,
    /// GRANTED grants.
    pub granted: u64,
    /// REVOKED grants.
    pub revoked: u64,
    /// Pending manual tasks.
    pub manual_task_count: u64,
}

/// Optional cache port for provisioning stats.
#[async_trait]
pub trait ProvisioningStatsCache: Send + Sync {
    /// Returns cached stats.
    async fn get_stats(&self) -> AppResult<Option<ProvisioningStats>>;

    /// Stores stats with ttl.
    async fn set_stats(&self, stats: ProvisioningStats, ttl_seconds: u32) -> AppResult<()>;
}

/// Read port for provisioning counters.
#[async_trait]
pub trait ProvisioningStatsRepository: Send + Sync {
    /// Counts grants by status and pending manual tasks.
    async fn provisioning_stats(&self) -> AppResult<ProvisioningStats>;
}
