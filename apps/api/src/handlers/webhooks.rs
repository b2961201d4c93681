use axum::Json;
use axum::extract::State;
use grantry_application::PaymentCompletedInput;
use grantry_domain::UserId;

use crate::dto::{PaymentCompletedRequest, PaymentCompletedResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn payment_completed_handler(
    State(state): State<AppState>,
    Json(payload): Json<PaymentCompletedRequest>,
) -> ApiResult<Json<PaymentCompletedResponse>> {
    let user_id = payload.user_id.parse::<UserId>()?;
    let outcome = state
        .fanout_service
        .handle_payment_completed(PaymentCompletedInput {
            checkout_session_id: payload.checkout_session_id,
            user_id,
        })
        .await?;

    Ok(Json(outcome.into()))
}
