//! Shared request plumbing for the upstream provisioning API.

use std::time::Duration;

use grantry_application::UpstreamSession;
use grantry_core::{AppError, AppResult};
use reqwest::{RequestBuilder, Url};

pub(crate) const SESSION_ID_HEADER: &str = "X-Upstream-Session";
pub(crate) const SESSION_SIGNATURE_HEADER: &str = "X-Upstream-Session-Signature";

/// Builds the HTTP client used for every upstream call. Timeouts surface as
/// transport errors and are classified like any other failed response.
pub fn build_upstream_http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build upstream HTTP client: {error}")))
}

/// Appends path segments to the session's API base URL, percent-encoding
/// each segment.
pub(crate) fn endpoint(api_url: &str, segments: &[&str]) -> AppResult<Url> {
    let mut url = Url::parse(api_url).map_err(|error| {
        AppError::Validation(format!("invalid upstream api url '{api_url}': {error}"))
    })?;

    url.path_segments_mut()
        .map_err(|()| {
            AppError::Validation(format!("upstream api url '{api_url}' cannot be a base"))
        })?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

pub(crate) fn with_session(builder: RequestBuilder, session: &UpstreamSession) -> RequestBuilder {
    builder
        .header(SESSION_ID_HEADER, session.session_id.as_str())
        .header(SESSION_SIGNATURE_HEADER, session.session_signature.as_str())
}

pub(crate) fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("upstream request timed out: {error}")
    } else if error.is_connect() {
        format!("upstream connection failed: {error}")
    } else {
        format!("upstream request failed: {error}")
    }
}
