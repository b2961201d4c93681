//! Provider selection and the controlled fallback policy.
//!
//! A failed primary call only falls back automatically to a different,
//! non-manual provider. Manual task creation stays an explicit event so an
//! upstream outage pauses provisioning through DEGRADED instead of flooding
//! the operator queue.

use std::collections::HashMap;
use std::sync::Arc;

use grantry_core::{AppError, AppResult};

use crate::provisioning_ports::{AccessProvider, ProviderKind, ProviderOutcome, ProvisioningRequest};

mod manual_provider;

pub use manual_provider::ManualAccessProvider;

/// Configured primary provider choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryProviderSetting {
    /// Automated API when configured, otherwise manual.
    Auto,
    /// One specific provider.
    Fixed(ProviderKind),
}

impl PrimaryProviderSetting {
    /// Parses configuration value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "" | "auto" => Ok(Self::Auto),
            other => ProviderKind::parse(other).map(Self::Fixed),
        }
    }
}

/// Provider operation executed through the selector.
#[derive(Debug, Clone, Copy)]
pub enum ProviderOperation<'a> {
    /// Username existence check.
    ValidateUsername(&'a str),
    /// Grant call.
    Grant(&'a ProvisioningRequest),
    /// Revoke call.
    Revoke(&'a ProvisioningRequest),
}

/// Outcome annotated with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderExecution {
    /// Provider whose outcome is returned.
    pub provider: ProviderKind,
    /// Classified outcome.
    pub outcome: ProviderOutcome,
}

/// Factory and fallback policy over the registered providers.
#[derive(Clone)]
pub struct ProviderSelector {
    providers: HashMap<ProviderKind, Arc<dyn AccessProvider>>,
    primary: PrimaryProviderSetting,
    fallback: ProviderKind,
}

impl ProviderSelector {
    /// Creates a selector. The manual provider is always registered.
    #[must_use]
    pub fn new(
        manual_provider: Arc<dyn AccessProvider>,
        primary: PrimaryProviderSetting,
        fallback: ProviderKind,
    ) -> Self {
        let mut providers = HashMap::new();
        providers.insert(ProviderKind::Manual, manual_provider);

        Self {
            providers,
            primary,
            fallback,
        }
    }

    /// Registers an additional provider strategy.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn AccessProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Returns the manual provider.
    pub fn manual(&self) -> AppResult<Arc<dyn AccessProvider>> {
        self.providers
            .get(&ProviderKind::Manual)
            .cloned()
            .ok_or_else(|| AppError::Internal("manual provider is not registered".to_owned()))
    }

    /// Resolves the primary provider for the next call.
    ///
    /// Unconfigured providers are never selected; the manual provider is the
    /// last resort.
    pub async fn primary(&self) -> AppResult<Arc<dyn AccessProvider>> {
        let preferred = match self.primary {
            PrimaryProviderSetting::Auto => ProviderKind::AutomatedApi,
            PrimaryProviderSetting::Fixed(kind) => kind,
        };

        if let Some(provider) = self.configured(preferred).await {
            return Ok(provider);
        }

        if preferred != ProviderKind::Manual {
            tracing::debug!(
                provider = preferred.as_str(),
                "primary provider is not configured, selecting manual"
            );
        }

        self.manual()
    }

    /// Runs an operation on the primary provider, applying the fallback
    /// policy on failure.
    pub async fn execute_with_fallback(
        &self,
        operation: ProviderOperation<'_>,
    ) -> AppResult<ProviderExecution> {
        let primary = self.primary().await?;
        let primary_kind = primary.kind();
        let primary_result = run_operation(primary.as_ref(), operation).await;

        let primary_failed = match &primary_result {
            Ok(outcome) => outcome.is_failure(),
            Err(_) => true,
        };
        if !primary_failed || !self.allows_automatic_fallback(primary_kind) {
            return primary_result.map(|outcome| ProviderExecution {
                provider: primary_kind,
                outcome,
            });
        }

        let Some(fallback) = self.configured(self.fallback).await else {
            return primary_result.map(|outcome| ProviderExecution {
                provider: primary_kind,
                outcome,
            });
        };

        tracing::info!(
            primary = primary_kind.as_str(),
            fallback = self.fallback.as_str(),
            "primary provider failed, trying fallback provider"
        );

        let outcome = run_operation(fallback.as_ref(), operation).await?;
        Ok(ProviderExecution {
            provider: self.fallback,
            outcome,
        })
    }

    fn allows_automatic_fallback(&self, primary_kind: ProviderKind) -> bool {
        self.fallback != primary_kind && self.fallback != ProviderKind::Manual
    }

    async fn configured(&self, kind: ProviderKind) -> Option<Arc<dyn AccessProvider>> {
        let provider = self.providers.get(&kind)?;
        if provider.is_configured().await {
            Some(provider.clone())
        } else {
            None
        }
    }
}

async fn run_operation(
    provider: &dyn AccessProvider,
    operation: ProviderOperation<'_>,
) -> AppResult<ProviderOutcome> {
    match operation {
        ProviderOperation::ValidateUsername(username) => provider.validate_username(username).await,
        ProviderOperation::Grant(request) => provider.grant_access(request).await,
        ProviderOperation::Revoke(request) => provider.revoke_access(request).await,
    }
}
