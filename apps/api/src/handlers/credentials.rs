use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use grantry_application::StoreCredentialsInput;
use grantry_core::OperatorIdentity;

use crate::dto::{CredentialStatusResponse, StoreCredentialsRequest, StoreCredentialsResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn store_credentials_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorIdentity>,
    Json(payload): Json<StoreCredentialsRequest>,
) -> ApiResult<(StatusCode, Json<StoreCredentialsResponse>)> {
    let result = state
        .credential_service
        .store_credentials(
            &operator,
            StoreCredentialsInput {
                session_id: payload.session_id,
                session_signature: payload.session_signature,
                api_url: payload.api_url,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(result.into())))
}

pub async fn credential_status_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<CredentialStatusResponse>> {
    let status = state.credential_service.credential_metadata().await?;

    Ok(Json(status.into()))
}
