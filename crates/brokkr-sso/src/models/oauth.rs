//! OAuth2 wire types for the authorize, callback and token endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::Profile;

/// Query parameters for `GET /authorize`.
///
/// The connection selector normally rides in `client_id` as a literal
/// `tenant=...&product=...` string or a minted client identifier; when
/// `client_id` is the placeholder `dummy`, the same literal may arrive in
/// `access_type`, `resource` or as one element of `scope` instead.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AuthorizeRequest {
    /// Only `code` is supported. Defaults to `code` when absent.
    pub response_type: Option<String>,
    /// Connection selector or minted client identifier.
    pub client_id: Option<String>,
    /// Where to send the browser back. Must match the connection's
    /// allow-list exactly.
    pub redirect_uri: Option<String>,
    /// Opaque SP value, echoed back on every redirect. Required.
    pub state: Option<String>,
    pub scope: Option<String>,
    /// Alternate carrier for the `tenant=...&product=...` selector.
    pub access_type: Option<String>,
    /// Alternate carrier for the `tenant=...&product=...` selector.
    pub resource: Option<String>,
    /// PKCE challenge (S256 only).
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Space-separated hints; `login` forces re-authentication upstream.
    pub prompt: Option<String>,
    /// `client_id` of the connection to use when several match the
    /// tenant/product pair.
    pub idp_hint: Option<String>,
}

/// Form body for `POST /token`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// Must be `authorization_code`.
    pub grant_type: Option<String>,
    pub code: Option<String>,
    /// Must byte-match the `redirect_uri` from the authorize request.
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// PKCE verifier; replaces the client secret when the authorize
    /// request carried a challenge.
    pub code_verifier: Option<String>,
}

/// JSON body returned by `POST /token`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    /// Profile established by the upstream login, returned inline so SPs
    /// can skip the userinfo round trip.
    pub profile: Profile,
}

/// Form posted by a SAML IdP to the assertion consumer service endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SamlAcsForm {
    /// Base64-encoded `samlp:Response` document.
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
    /// Session correlation value from the authorize step. Absent or
    /// foreign values mean an IdP-initiated login.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Query parameters on the upstream OIDC callback.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct OidcCallbackQuery {
    pub code: Option<String>,
    /// Broker session identifier, sent upstream as `state`.
    pub state: Option<String>,
    /// Upstream error code, present instead of `code` on failure.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Query parameters for the admin connection lookup.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ConnectionQuery {
    pub tenant: Option<String>,
    pub product: Option<String>,
    pub client_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_request_deserializes_from_query_pairs() {
        let query = "client_id=tenant%3Dacme.com%26product%3Dcrm&state=abc123\
                     &redirect_uri=https%3A%2F%2Fsp.example.com%2Fdone&response_type=code";

        let request: AuthorizeRequest = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(request.client_id.as_deref(), Some("tenant=acme.com&product=crm"));
        assert_eq!(request.state.as_deref(), Some("abc123"));
        assert_eq!(request.response_type.as_deref(), Some("code"));
        assert!(request.idp_hint.is_none());
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse {
            access_token: "tok".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 300,
            profile: Profile {
                id: "user-1".to_string(),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["expires_in"], 300);
        assert_eq!(json["profile"]["id"], "user-1");
    }

    #[test]
    fn test_acs_form_uses_saml_casing() {
        let form: SamlAcsForm =
            serde_urlencoded::from_str("SAMLResponse=PHNhbWw%2BZm9vPC9zYW1sPg%3D%3D&RelayState=brokkr_sso_1")
                .unwrap();
        assert_eq!(form.relay_state.as_deref(), Some("brokkr_sso_1"));
        assert!(!form.saml_response.is_empty());
    }
}
