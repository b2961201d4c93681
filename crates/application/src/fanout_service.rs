use std::sync::Arc;

use grantry_core::AppResult;
use grantry_domain::{CheckoutSessionId, UserId};

use crate::provisioning_ports::{CompletePurchaseInput, FanoutOutcome, FanoutRepository};

const PAYMENT_WEBHOOK_SUBJECT: &str = "system:payment-webhook";

/// Payment-completion event as delivered by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCompletedInput {
    /// Checkout session id; the idempotency key.
    pub checkout_session_id: String,
    /// Purchasing customer.
    pub user_id: UserId,
}

/// Idempotent payment-completion fan-out.
#[derive(Clone)]
pub struct FanoutService {
    repository: Arc<dyn FanoutRepository>,
}

impl FanoutService {
    /// Creates a fan-out service.
    #[must_use]
    pub fn new(repository: Arc<dyn FanoutRepository>) -> Self {
        Self { repository }
    }

    /// Completes the purchase and enqueues one job per upserted grant.
    /// Duplicate deliveries return [`FanoutOutcome::AlreadyProcessed`].
    pub async fn handle_payment_completed(
        &self,
        input: PaymentCompletedInput,
    ) -> AppResult<FanoutOutcome> {
        let checkout_session_id = CheckoutSessionId::new(input.checkout_session_id)?;

        let outcome = self
            .repository
            .complete_purchase(CompletePurchaseInput {
                checkout_session_id: checkout_session_id.clone(),
                user_id: input.user_id,
                subject: PAYMENT_WEBHOOK_SUBJECT.to_owned(),
            })
            .await?;

        match &outcome {
            FanoutOutcome::Processed {
                purchase_id,
                access_grant_ids,
            } => tracing::info!(
                purchase_id = %purchase_id,
                user_id = %input.user_id,
                grants = access_grant_ids.len(),
                "purchase completed and access fanned out"
            ),
            FanoutOutcome::AlreadyProcessed { .. } => tracing::info!(
                checkout_session_id = %checkout_session_id.as_str(),
                "payment completion already processed"
            ),
        }

        Ok(outcome)
    }
}
