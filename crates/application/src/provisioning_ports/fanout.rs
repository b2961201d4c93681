use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{AccessGrantId, CheckoutSessionId, PurchaseId, UserId};

/// Payment-completion fan-out request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletePurchaseInput {
    /// Idempotency key from the payment provider.
    pub checkout_session_id: CheckoutSessionId,
    /// Purchasing customer.
    pub user_id: UserId,
    /// Audit subject.
    pub subject: String,
}

/// Result of one payment-completion delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// This delivery completed the purchase.
    Processed {
        /// Completed purchase.
        purchase_id: PurchaseId,
        /// Grants set to PENDING and enqueued.
        access_grant_ids: Vec<AccessGrantId>,
    },
    /// An earlier delivery already completed the purchase.
    AlreadyProcessed {
        /// Completed purchase, when it could be read back.
        purchase_id: Option<PurchaseId>,
    },
}

/// Repository port for the atomic payment-completion fan-out.
///
/// One call marks the purchase COMPLETED, upserts one PENDING grant per
/// active resource (grants already GRANTED are left alone), enqueues one job
/// per upserted grant and writes the audit entry, all in one transaction.
/// Unique-constraint races resolve to [`FanoutOutcome::AlreadyProcessed`].
#[async_trait]
pub trait FanoutRepository: Send + Sync {
    /// Completes one purchase.
    async fn complete_purchase(&self, input: CompletePurchaseInput) -> AppResult<FanoutOutcome>;
}
