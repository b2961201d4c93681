use grantry_application::FanoutOutcome;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Payment-completion webhook payload.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/payment-completed-request.ts"
)]
pub struct PaymentCompletedRequest {
    pub checkout_session_id: String,
    pub user_id: String,
}

/// Fan-out result returned to the payment provider.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/payment-completed-response.ts"
)]
pub struct PaymentCompletedResponse {
    /// `processed` or `already_processed`.
    pub status: String,
    pub purchase_id: Option<String>,
    pub access_grants: Vec<String>,
}

impl From<FanoutOutcome> for PaymentCompletedResponse {
    fn from(outcome: FanoutOutcome) -> Self {
        match outcome {
            FanoutOutcome::Processed {
                purchase_id,
                access_grant_ids,
            } => Self {
                status: "processed".to_owned(),
                purchase_id: Some(purchase_id.to_string()),
                access_grants: access_grant_ids
                    .into_iter()
                    .map(|grant_id| grant_id.to_string())
                    .collect(),
            },
            FanoutOutcome::AlreadyProcessed { purchase_id } => Self {
                status: "already_processed".to_owned(),
                purchase_id: purchase_id.map(|purchase_id| purchase_id.to_string()),
                access_grants: Vec::new(),
            },
        }
    }
}
