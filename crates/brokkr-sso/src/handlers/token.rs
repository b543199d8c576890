//! Token endpoint handler.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::{Form, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::instrument;

use crate::error::SsoError;
use crate::models::{TokenRequest, TokenResponse};
use crate::router::SsoState;

/// Exchange an authorization code for an access token.
#[utoipa::path(
    post,
    path = "/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Invalid grant or malformed request"),
        (status = 401, description = "Client authentication failed"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, headers, request))]
pub async fn token_handler(
    State(state): State<SsoState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, SsoError> {
    let request = with_basic_auth(request, &headers)?;
    let response = state.token.exchange(&request).await?;
    Ok(Json(response))
}

/// Fill client credentials from an HTTP Basic `Authorization` header.
/// Header credentials take precedence over the form body.
fn with_basic_auth(mut request: TokenRequest, headers: &HeaderMap) -> Result<TokenRequest, SsoError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(request);
    };
    let auth = auth_header
        .to_str()
        .map_err(|_| SsoError::InvalidClient("invalid authorization header".to_string()))?;
    let Some(encoded) = auth.strip_prefix("Basic ") else {
        return Ok(request);
    };

    let decoded = STANDARD.decode(encoded).map_err(|_| {
        SsoError::InvalidClient("invalid base64 in authorization header".to_string())
    })?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| SsoError::InvalidClient("invalid UTF-8 in credentials".to_string()))?;
    let Some((client_id, client_secret)) = decoded.split_once(':') else {
        return Err(SsoError::InvalidClient(
            "invalid credential format".to_string(),
        ));
    };

    request.client_id = Some(client_id.to_string());
    request.client_secret = Some(client_secret.to_string());
    Ok(request)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_basic_auth_fills_credentials() {
        let mut headers = HeaderMap::new();
        // "test-client:test-secret"
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dGVzdC1jbGllbnQ6dGVzdC1zZWNyZXQ="),
        );

        let request = with_basic_auth(TokenRequest::default(), &headers).unwrap();
        assert_eq!(request.client_id.as_deref(), Some("test-client"));
        assert_eq!(request.client_secret.as_deref(), Some("test-secret"));
    }

    #[test]
    fn test_header_credentials_win_over_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dGVzdC1jbGllbnQ6dGVzdC1zZWNyZXQ="),
        );

        let body = TokenRequest {
            client_id: Some("body-client".to_string()),
            client_secret: Some("body-secret".to_string()),
            ..Default::default()
        };
        let request = with_basic_auth(body, &headers).unwrap();
        assert_eq!(request.client_id.as_deref(), Some("test-client"));
    }

    #[test]
    fn test_body_credentials_survive_without_header() {
        let body = TokenRequest {
            client_id: Some("body-client".to_string()),
            client_secret: Some("body-secret".to_string()),
            ..Default::default()
        };
        let request = with_basic_auth(body, &HeaderMap::new()).unwrap();
        assert_eq!(request.client_id.as_deref(), Some("body-client"));
        assert_eq!(request.client_secret.as_deref(), Some("body-secret"));
    }

    #[test]
    fn test_malformed_basic_auth_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic !!!not-base64!!!"),
        );
        assert!(with_basic_auth(TokenRequest::default(), &headers).is_err());

        // "no-colon-here"
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic bm8tY29sb24taGVyZQ=="),
        );
        assert!(with_basic_auth(TokenRequest::default(), &headers).is_err());
    }
}
