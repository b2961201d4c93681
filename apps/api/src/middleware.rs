use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use grantry_core::{AppError, AppResult, OperatorIdentity};
use subtle::ConstantTimeEq;

use crate::error::ApiResult;
use crate::state::AppState;

pub const OPERATOR_HEADER: &str = "x-grantry-operator";
pub const WEBHOOK_SECRET_HEADER: &str = "x-grantry-webhook-secret";

const DEFAULT_OPERATOR: &str = "admin";

pub async fn require_admin_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let operator = authorize_admin(request.headers(), state.admin_api_token.as_str())?;

    request.extensions_mut().insert(operator);
    Ok(next.run(request).await)
}

pub async fn require_webhook_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    authorize_webhook(request.headers(), state.payment_webhook_secret.as_str())?;

    Ok(next.run(request).await)
}

/// Checks the admin bearer token and resolves the acting operator.
pub fn authorize_admin(headers: &HeaderMap, admin_api_token: &str) -> AppResult<OperatorIdentity> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("admin bearer token required".to_owned()))?;

    if !secrets_match(token, admin_api_token) {
        return Err(AppError::Unauthorized("invalid admin token".to_owned()));
    }

    let operator = headers
        .get(OPERATOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_OPERATOR);

    Ok(OperatorIdentity::new(format!("operator:{operator}"), operator))
}

/// Checks the shared payment webhook secret.
pub fn authorize_webhook(headers: &HeaderMap, webhook_secret: &str) -> AppResult<()> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("webhook secret required".to_owned()))?;

    if !secrets_match(provided, webhook_secret) {
        return Err(AppError::Unauthorized("invalid webhook secret".to_owned()));
    }

    Ok(())
}

fn secrets_match(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}
