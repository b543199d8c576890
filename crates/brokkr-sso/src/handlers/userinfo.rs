//! Userinfo endpoint handler.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use tracing::instrument;

use crate::error::SsoError;
use crate::models::UserInfoResponse;
use crate::router::SsoState;

/// Return the profile behind a bearer token.
#[utoipa::path(
    get,
    path = "/userinfo",
    responses(
        (status = 200, description = "Profile for the presented token", body = UserInfoResponse),
        (status = 401, description = "Missing, unknown or expired token"),
    ),
    security(("bearer" = [])),
    tag = "SSO"
)]
#[instrument(skip(state, headers))]
pub async fn userinfo_handler(
    State(state): State<SsoState>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, SsoError> {
    let token = bearer_token(&headers)?;
    Ok(Json(state.token.userinfo(token).await?))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, SsoError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| SsoError::InvalidToken("missing bearer token".to_string()))?
        .to_str()
        .map_err(|_| SsoError::InvalidToken("invalid authorization header".to_string()))?;
    auth.strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SsoError::InvalidToken("missing bearer token".to_string()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn test_missing_or_wrong_scheme_is_rejected() {
        assert!(bearer_token(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(bearer_token(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
