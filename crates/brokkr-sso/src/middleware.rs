//! Admin API authentication.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::SsoError;
use crate::router::SsoState;

/// Require an `Authorization: Api-Key <key>` header matching one of the
/// configured admin keys. With no keys configured every request is
/// rejected, so the admin API is off until keys are provisioned.
pub async fn require_api_key(
    State(state): State<SsoState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Api-Key "))
        .unwrap_or_default();

    if presented.is_empty() || !key_matches(presented, &state.options.admin_api_keys) {
        return Err(
            SsoError::InvalidClient("a valid admin API key is required".to_string())
                .into_response(),
        );
    }
    Ok(next.run(request).await)
}

/// Compare against every configured key so timing reveals neither a match
/// nor its position.
fn key_matches(presented: &str, keys: &[String]) -> bool {
    let mut matched = false;
    for key in keys {
        matched |= bool::from(presented.as_bytes().ct_eq(key.as_bytes()));
    }
    matched
}
