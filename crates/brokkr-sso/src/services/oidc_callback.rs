//! Upstream OIDC callback handling: code exchange against the provider's
//! token endpoint, ID-token claim checks and authorization-code minting.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use brokkr_store::Store;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use crate::error::{SsoError, SsoResult};
use crate::models::{
    AuthCodePayload, CodeSession, IdpConfig, LoginSession, OidcCallbackQuery, OidcIdp, Profile,
};
use crate::oidc::{fetch_discovery, OidcDiscovery, UPSTREAM_TIMEOUT};
use crate::router::SsoOptions;
use crate::services::{generate_opaque_token, ConnectionService};

/// Token endpoint response from the upstream provider. Everything except
/// the ID token is ignored; the broker mints its own access tokens.
#[derive(Debug, Deserialize)]
struct UpstreamTokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

/// Consumes provider callbacks at the OIDC redirect endpoint.
#[derive(Clone)]
pub struct OidcCallbackService {
    connections: ConnectionService,
    sessions: Store,
    codes: Store,
    http: reqwest::Client,
    options: SsoOptions,
}

impl OidcCallbackService {
    #[must_use]
    pub fn new(
        connections: ConnectionService,
        sessions: Store,
        codes: Store,
        http: reqwest::Client,
        options: SsoOptions,
    ) -> Self {
        Self {
            connections,
            sessions,
            codes,
            http,
            options,
        }
    }

    /// Pop the login session referenced by the callback `state`. Unlike
    /// SAML there is no unsolicited variant; a missing or unknown state is
    /// always an error, answered directly because no verified redirect
    /// target exists without the session.
    pub async fn take_session(&self, state: Option<&str>) -> SsoResult<LoginSession> {
        let state = state.filter(|s| !s.is_empty()).ok_or_else(|| {
            SsoError::InvalidRequest("state is missing from the callback".to_string())
        })?;
        match self.sessions.take::<LoginSession>(state).await? {
            Some(session) => Ok(session),
            None => Err(SsoError::InvalidRequest(
                "login session not found or expired".to_string(),
            )),
        }
    }

    /// Exchange the provider's code, validate the ID token and mint an
    /// authorization code, returning the SP redirect URL carrying it.
    #[instrument(skip(self, query, session), fields(connection = %session.connection_client_id))]
    pub async fn process(
        &self,
        query: &OidcCallbackQuery,
        session: &LoginSession,
    ) -> SsoResult<String> {
        if let Some(error) = query.error.as_deref().filter(|e| !e.is_empty()) {
            return Err(SsoError::UpstreamAuthFailed {
                error: error.to_string(),
                description: query.error_description.clone().unwrap_or_default(),
            });
        }
        let code = query.code.as_deref().filter(|c| !c.is_empty()).ok_or_else(|| {
            SsoError::InvalidRequest("callback carries neither code nor error".to_string())
        })?;

        let connection = self
            .connections
            .get(&session.connection_client_id)
            .await?
            .ok_or_else(|| SsoError::InvalidRequest("connection no longer exists".to_string()))?;
        let IdpConfig::Oidc(oidc) = &connection.idp else {
            return Err(SsoError::InvalidRequest(
                "the resolved connection is not an OIDC connection".to_string(),
            ));
        };

        let discovery = fetch_discovery(&self.http, &oidc.discovery_url).await?;
        let id_token = self.exchange_code(&discovery, oidc, code, session).await?;
        let claims = decode_id_token_claims(&id_token)?;
        validate_claims(
            &claims,
            &discovery.issuer,
            &oidc.client_id,
            session.oidc_nonce.as_deref(),
        )?;
        let profile = profile_from_claims(claims)?;

        let auth_code = generate_opaque_token();
        let payload = AuthCodePayload {
            connection_client_id: connection.client_id.clone(),
            tenant: connection.tenant.clone(),
            product: connection.product.clone(),
            profile,
            session: Some(CodeSession::from(session)),
        };
        self.codes.put(&auth_code, &payload, &[]).await?;

        let mut url = Url::parse(&session.redirect_uri).map_err(|e| {
            SsoError::Internal(format!("stored redirect_uri failed to parse: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("code", &auth_code)
            .append_pair("state", &session.state);
        info!("authorization code issued");
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        discovery: &OidcDiscovery,
        oidc: &OidcIdp,
        code: &str,
        session: &LoginSession,
    ) -> SsoResult<String> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.options.oidc_callback_url()),
            ("client_id", oidc.client_id.clone()),
            ("client_secret", oidc.client_secret.clone()),
        ];
        if let Some(verifier) = &session.oidc_code_verifier {
            params.push(("code_verifier", verifier.clone()));
        }

        let response = self
            .http
            .post(&discovery.token_endpoint)
            .timeout(UPSTREAM_TIMEOUT)
            .form(&params)
            .send()
            .await
            .map_err(|e| SsoError::UpstreamUnavailable(format!("token exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(SsoError::UpstreamAuthFailed {
                error: "token_exchange_failed".to_string(),
                description: format!("{status}: {body}"),
            });
        }

        let token: UpstreamTokenResponse = response.json().await.map_err(|e| {
            SsoError::UpstreamAuthFailed {
                error: "invalid_token_response".to_string(),
                description: e.to_string(),
            }
        })?;
        token.id_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            SsoError::UpstreamAuthFailed {
                error: "invalid_token_response".to_string(),
                description: "token response carried no id_token".to_string(),
            }
        })
    }
}

fn claim_error(description: &str) -> SsoError {
    SsoError::UpstreamAuthFailed {
        error: "invalid_id_token".to_string(),
        description: description.to_string(),
    }
}

/// Decode the payload segment of a compact JWT without verifying the
/// signature. Trust comes from fetching the token over TLS directly from
/// the provider's token endpoint, not from the token signature.
fn decode_id_token_claims(
    id_token: &str,
) -> SsoResult<serde_json::Map<String, serde_json::Value>> {
    let mut segments = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(claim_error("token is not a compact JWT"));
    };
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| claim_error(&format!("payload decode failed: {e}")))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| claim_error(&format!("payload is not a JSON object: {e}")))
}

fn validate_claims(
    claims: &serde_json::Map<String, serde_json::Value>,
    expected_issuer: &str,
    client_id: &str,
    expected_nonce: Option<&str>,
) -> SsoResult<()> {
    match claims.get("iss").and_then(|v| v.as_str()) {
        Some(iss) if iss.trim_end_matches('/') == expected_issuer.trim_end_matches('/') => {}
        _ => return Err(claim_error("issuer mismatch")),
    }

    let audience_ok = match claims.get("aud") {
        Some(serde_json::Value::String(aud)) => aud == client_id,
        Some(serde_json::Value::Array(auds)) => {
            auds.iter().any(|a| a.as_str() == Some(client_id))
        }
        _ => false,
    };
    if !audience_ok {
        return Err(claim_error("audience mismatch"));
    }

    if let Some(expected) = expected_nonce {
        match claims.get("nonce").and_then(|v| v.as_str()) {
            Some(nonce) if nonce == expected => {}
            _ => return Err(claim_error("nonce mismatch")),
        }
    }

    Ok(())
}

fn profile_from_claims(claims: serde_json::Map<String, serde_json::Value>) -> SsoResult<Profile> {
    let id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| claim_error("token carries no sub claim"))?;
    let email = claims.get("email").and_then(|v| v.as_str()).map(str::to_string);
    let first_name = claims
        .get("given_name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let last_name = claims
        .get("family_name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(Profile {
        id,
        email,
        first_name,
        last_name,
        raw: claims,
    })
}
