//! Redis-backed provisioning stats cache.

use async_trait::async_trait;
use grantry_application::{ProvisioningStats, ProvisioningStatsCache};
use grantry_core::{AppError, AppResult};
use redis::AsyncCommands;

/// Redis implementation of the provisioning stats cache port.
#[derive(Clone)]
pub struct RedisProvisioningStatsCache {
    client: redis::Client,
    key: String,
}

impl RedisProvisioningStatsCache {
    /// Creates a cache adapter storing stats under `{key_prefix}:provisioning_stats`.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: &str) -> Self {
        Self {
            client,
            key: format!("{key_prefix}:provisioning_stats"),
        }
    }
}

#[async_trait]
impl ProvisioningStatsCache for RedisProvisioningStatsCache {
    async fn get_stats(&self) -> AppResult<Option<ProvisioningStats>> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let encoded: Option<String> = connection.get(self.key.as_str()).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to read provisioning stats cache entry: {error}"
            ))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<ProvisioningStats>(value).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid provisioning stats cache value '{value}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn set_stats(&self, stats: ProvisioningStats, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let value = serde_json::to_string(&stats).map_err(|error| {
            AppError::Internal(format!("failed to encode provisioning stats: {error}"))
        })?;
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        connection
            .set_ex(self.key.as_str(), value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to write provisioning stats cache entry: {error}"
                ))
            })
    }
}
