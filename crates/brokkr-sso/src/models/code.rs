//! Authorization-code and access-token payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Profile;

/// Snapshot of the authorize-time request parameters a code stays bound to.
/// Checked again at the token exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSession {
    pub redirect_uri: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

impl From<&crate::models::LoginSession> for CodeSession {
    fn from(session: &crate::models::LoginSession) -> Self {
        Self {
            redirect_uri: session.redirect_uri.clone(),
            state: session.state.clone(),
            code_challenge: session.code_challenge.clone(),
            code_challenge_method: session.code_challenge_method.clone(),
        }
    }
}

/// Payload behind a single-use authorization code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCodePayload {
    pub connection_client_id: String,
    pub tenant: String,
    pub product: String,
    pub profile: Profile,
    /// Absent for IdP-initiated logins, which have no originating SP
    /// request to hold the exchange against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<CodeSession>,
}

/// Payload behind an opaque access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenPayload {
    pub tenant: String,
    pub product: String,
    pub profile: Profile,
}

/// Body returned by the userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub tenant: String,
    pub product: String,
    #[schema(value_type = Object)]
    pub raw: serde_json::Map<String, serde_json::Value>,
}

impl From<AccessTokenPayload> for UserInfoResponse {
    fn from(payload: AccessTokenPayload) -> Self {
        Self {
            id: payload.profile.id,
            email: payload.profile.email,
            first_name: payload.profile.first_name,
            last_name: payload.profile.last_name,
            tenant: payload.tenant,
            product: payload.product,
            raw: payload.profile.raw,
        }
    }
}
