//! Authorization-code exchange and bearer-token introspection.

use brokkr_store::Store;
use subtle::ConstantTimeEq;
use tracing::{info, instrument};

use crate::error::{SsoError, SsoResult};
use crate::models::{
    AccessTokenPayload, AuthCodePayload, CodeSession, Connection, TokenRequest, TokenResponse,
    UserInfoResponse,
};
use crate::pkce;
use crate::router::SsoOptions;
use crate::services::authorize::decode_tenant_product;
use crate::services::{generate_opaque_token, ConnectionService};

/// Implements `POST /token` and `GET /userinfo`.
#[derive(Clone)]
pub struct TokenService {
    connections: ConnectionService,
    codes: Store,
    tokens: Store,
    options: SsoOptions,
}

impl TokenService {
    #[must_use]
    pub fn new(
        connections: ConnectionService,
        codes: Store,
        tokens: Store,
        options: SsoOptions,
    ) -> Self {
        Self {
            connections,
            codes,
            tokens,
            options,
        }
    }

    /// Exchange an authorization code for a bearer token.
    ///
    /// The code is consumed before any credential check runs. A code that
    /// reaches this endpoint is spent whether or not the exchange succeeds,
    /// so a leaked code cannot be retried against different credentials.
    #[instrument(skip_all)]
    pub async fn exchange(&self, request: &TokenRequest) -> SsoResult<TokenResponse> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => {}
            _ => {
                return Err(SsoError::InvalidRequest(
                    "grant_type must be authorization_code".to_string(),
                ))
            }
        }
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SsoError::InvalidRequest("code is required".to_string()))?;

        let payload: AuthCodePayload = self
            .codes
            .take(code)
            .await?
            .ok_or_else(|| {
                SsoError::InvalidGrant("invalid or expired authorization code".to_string())
            })?;

        let connection = self
            .connections
            .get(&payload.connection_client_id)
            .await?
            .ok_or_else(|| SsoError::InvalidGrant("connection no longer exists".to_string()))?;

        if let Some(session) = &payload.session {
            verify_redirect_uri(request, session)?;
        }
        verify_client(request, &connection, payload.session.as_ref())?;

        let access_token = generate_opaque_token();
        let token_payload = AccessTokenPayload {
            tenant: payload.tenant.clone(),
            product: payload.product.clone(),
            profile: payload.profile.clone(),
        };
        self.tokens.put(&access_token, &token_payload, &[]).await?;

        info!(
            tenant = %payload.tenant,
            product = %payload.product,
            "access token issued"
        );
        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.options.token_ttl,
            profile: payload.profile,
        })
    }

    /// Look up the profile behind a bearer token.
    pub async fn userinfo(&self, token: &str) -> SsoResult<UserInfoResponse> {
        let payload: AccessTokenPayload = self.tokens.get(token).await?.ok_or_else(|| {
            SsoError::InvalidToken("unknown or expired access token".to_string())
        })?;
        Ok(UserInfoResponse::from(payload))
    }
}

/// SP-initiated codes replay the original redirect_uri; it must be sent
/// again and match byte for byte.
fn verify_redirect_uri(request: &TokenRequest, session: &CodeSession) -> SsoResult<()> {
    let redirect_uri = request
        .redirect_uri
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| SsoError::InvalidRequest("redirect_uri is required".to_string()))?;
    if redirect_uri != session.redirect_uri {
        return Err(SsoError::InvalidGrant(
            "redirect_uri does not match the authorization request".to_string(),
        ));
    }
    Ok(())
}

/// Client authentication: a PKCE verifier when the authorize request
/// carried a challenge, otherwise the connection's minted credentials.
fn verify_client(
    request: &TokenRequest,
    connection: &Connection,
    session: Option<&CodeSession>,
) -> SsoResult<()> {
    if let Some(verifier) = request.code_verifier.as_deref().filter(|v| !v.is_empty()) {
        let challenge = session
            .and_then(|s| s.code_challenge.as_deref())
            .ok_or_else(|| {
                SsoError::InvalidGrant(
                    "the authorization request did not carry a code challenge".to_string(),
                )
            })?;
        if !pkce::verify_s256(verifier, challenge) {
            return Err(SsoError::InvalidGrant(
                "code verifier does not match the challenge".to_string(),
            ));
        }
        return Ok(());
    }

    let client_id = request
        .client_id
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SsoError::InvalidClient("client authentication required".to_string()))?;

    let client_matches = match decode_tenant_product(client_id) {
        Some((tenant, product)) => tenant == connection.tenant && product == connection.product,
        None => client_id == connection.client_id,
    };
    if !client_matches {
        return Err(SsoError::InvalidClient(
            "client_id does not match the authorization".to_string(),
        ));
    }

    let client_secret = request
        .client_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SsoError::InvalidClient("client authentication required".to_string()))?;
    let matches: bool = client_secret
        .as_bytes()
        .ct_eq(connection.client_secret.as_bytes())
        .into();
    if !matches {
        return Err(SsoError::InvalidGrant(
            "client_secret does not match".to_string(),
        ));
    }
    Ok(())
}
