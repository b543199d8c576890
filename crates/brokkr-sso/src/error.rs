//! Broker error types.
//!
//! The wire shape follows RFC 6749: failures surface as
//! `{"error": "...", "error_description": "..."}` JSON, or as error query
//! parameters on a redirect once a verified redirect target exists.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OAuth2 wire error codes emitted by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SsoErrorCode {
    /// The request is missing or malforms a required parameter.
    InvalidRequest,
    /// The tenant/product/client could not be resolved to a connection.
    InvalidClient,
    /// Bad, expired or already-consumed code; PKCE or secret mismatch.
    InvalidGrant,
    /// `response_type` other than `code`.
    UnsupportedResponseType,
    /// The upstream IdP denied or failed the authentication.
    AccessDenied,
    /// Storage or other internal failure.
    ServerError,
    /// The upstream IdP could not be reached in time.
    TemporarilyUnavailable,
    /// The bearer token is invalid or expired.
    InvalidToken,
}

impl std::fmt::Display for SsoErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::AccessDenied => "access_denied",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::InvalidToken => "invalid_token",
        };
        write!(f, "{s}")
    }
}

/// Error body following RFC 6749 Section 5.2.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SsoErrorResponse {
    pub error: SsoErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl SsoErrorResponse {
    pub fn new(error: SsoErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }
}

/// Broker failures across the authorize/callback/token state machine.
#[derive(Debug, Error)]
pub enum SsoError {
    /// Missing or malformed required parameter.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown tenant/product/clientID.
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// `redirect_uri` absent or not on the connection's allow-list. Never
    /// answered with a redirect to the offending URI.
    #[error("Invalid redirect_uri: {0}")]
    InvalidRedirectUri(String),

    /// `response_type` other than `code`.
    #[error("Unsupported response_type: {0}")]
    UnsupportedResponseType(String),

    /// Bad/expired/consumed code, PKCE mismatch, secret mismatch, or
    /// redirect_uri mismatch at exchange time.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// SAML response failed validation (status, issuer, audience,
    /// signature, or missing RelayState correlation).
    #[error("Invalid SAML response: {0}")]
    InvalidSamlResponse(String),

    /// The upstream IdP reported an authentication failure. Not retried:
    /// the browser redirect already communicated the outcome.
    #[error("Upstream authentication failed: {error}: {description}")]
    UpstreamAuthFailed { error: String, description: String },

    /// The upstream IdP was unreachable or timed out.
    #[error("Upstream IdP unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Bearer token rejected at the profile endpoint.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Admin lookup miss.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failure; fatal to the request, not retried.
    #[error("Storage failure: {0}")]
    Storage(#[from] brokkr_store::StoreError),

    /// Anything else that should not happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SsoError {
    /// HTTP status for the direct-JSON rendering of this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidRedirectUri(_)
            | Self::UnsupportedResponseType(_)
            | Self::InvalidGrant(_)
            | Self::InvalidSamlResponse(_) => StatusCode::BAD_REQUEST,
            Self::InvalidClient(_) | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamAuthFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamUnavailable(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// OAuth2 wire code for this error.
    #[must_use]
    pub fn error_code(&self) -> SsoErrorCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidRedirectUri(_)
            | Self::InvalidSamlResponse(_)
            | Self::NotFound(_) => SsoErrorCode::InvalidRequest,
            Self::InvalidClient(_) => SsoErrorCode::InvalidClient,
            Self::UnsupportedResponseType(_) => SsoErrorCode::UnsupportedResponseType,
            Self::InvalidGrant(_) => SsoErrorCode::InvalidGrant,
            Self::UpstreamAuthFailed { .. } => SsoErrorCode::AccessDenied,
            Self::UpstreamUnavailable(_) => SsoErrorCode::TemporarilyUnavailable,
            Self::InvalidToken(_) => SsoErrorCode::InvalidToken,
            Self::Storage(_) | Self::Internal(_) => SsoErrorCode::ServerError,
        }
    }

    /// Convert to the RFC 6749 JSON body.
    #[must_use]
    pub fn to_response(&self) -> SsoErrorResponse {
        SsoErrorResponse::new(self.error_code(), self.to_string())
    }
}

impl IntoResponse for SsoError {
    fn into_response(self) -> Response {
        (&self).into_response()
    }
}

impl IntoResponse for &SsoError {
    fn into_response(self) -> Response {
        if matches!(self, SsoError::Storage(_) | SsoError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

/// Result alias for broker operations.
pub type SsoResult<T> = Result<T, SsoError>;
