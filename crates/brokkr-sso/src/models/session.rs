//! In-flight login session.

use serde::{Deserialize, Serialize};

/// Prefix on every session identifier. RelayState values without it are
/// treated as IdP-initiated logins rather than session references.
pub const SESSION_ID_PREFIX: &str = "brokkr_sso_";

/// Correlates an SP authorization request with the response coming back
/// from the upstream IdP.
///
/// Written before the browser is sent upstream; the session ID travels as
/// the SAML `RelayState` or the OIDC `state` parameter and the record is
/// consumed (single use) when the IdP calls back. Sessions expire on their
/// own if the user never completes the login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSession {
    /// Session identifier, also the storage key.
    pub id: String,
    /// `client_id` of the connection the login was routed to.
    pub connection_client_id: String,
    pub tenant: String,
    pub product: String,
    /// SP redirect target, already validated against the allow-list.
    pub redirect_uri: String,
    /// SP `state`, echoed back on the final redirect.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// SP PKCE challenge, carried through to the token exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
    /// Whether the SP asked for a fresh upstream login (`prompt=login`).
    #[serde(default)]
    pub force_authn: bool,
    /// SAML upstream only: ID of the `AuthnRequest` we sent, checked
    /// against the response's `InResponseTo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_request_id: Option<String>,
    /// OIDC upstream only: nonce expected back in the ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_nonce: Option<String>,
    /// OIDC upstream only: PKCE verifier for the upstream code exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_code_verifier: Option<String>,
}
