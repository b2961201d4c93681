use grantry_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Payment provider checkout session identifier.
///
/// This is the idempotency key of the payment-completion webhook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutSessionId(NonEmptyString);

impl CheckoutSessionId {
    /// Creates a validated checkout session identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.len() > 255 {
            return Err(AppError::Validation(
                "checkout session id must be at most 255 characters".to_owned(),
            ));
        }

        Ok(Self(NonEmptyString::new(trimmed)?))
    }

    /// Returns the identifier value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Purchase lifecycle status as seen by provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Checkout started but not confirmed.
    Pending,
    /// Payment confirmed and access fanned out.
    Completed,
}

impl PurchaseStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(AppError::Validation(format!(
                "unknown purchase status '{value}'"
            ))),
        }
    }
}
