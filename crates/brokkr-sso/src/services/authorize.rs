//! The authorize endpoint's two phases.
//!
//! [`AuthorizeService::resolve`] performs the checks that must fail with a
//! direct JSON response (missing `state`, unknown connection, bad
//! `redirect_uri`); only a request that passes it has a redirect target
//! errors may be sent to. [`AuthorizeService::initiate`] then runs the
//! remaining validation and hands the browser to the IdP; its failures are
//! rendered as error redirects by the handler.

use brokkr_store::Store;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, instrument};
use url::Url;

use crate::error::{SsoError, SsoResult};
use crate::models::{AuthorizeRequest, Connection, IdpConfig, LoginSession, SESSION_ID_PREFIX};
use crate::oidc::fetch_discovery;
use crate::pkce;
use crate::router::SsoOptions;
use crate::saml::{build_authn_request, post_binding_form, redirect_binding_url};
use crate::services::{generate_opaque_token, ConnectionService};

/// Scope requested from upstream OIDC providers.
const UPSTREAM_OIDC_SCOPE: &str = "openid email profile";

/// Outcome of pre-redirect validation: a connection plus a redirect target
/// that is safe to send error responses to.
#[derive(Debug, Clone)]
pub struct ResolvedAuthorize {
    pub connection: Connection,
    pub redirect_uri: String,
    pub state: String,
}

/// What the authorize endpoint should do with the browser.
#[derive(Debug, Clone)]
pub enum AuthorizeAction {
    /// Redirect to the IdP (SAML HTTP-Redirect binding or OIDC).
    Redirect(String),
    /// Self-submitting HTML form (SAML HTTP-POST binding).
    HtmlForm(String),
}

/// Routes authorization requests to the right connection and initiates the
/// upstream login.
#[derive(Clone)]
pub struct AuthorizeService {
    connections: ConnectionService,
    sessions: Store,
    http: reqwest::Client,
    options: SsoOptions,
}

impl AuthorizeService {
    #[must_use]
    pub fn new(
        connections: ConnectionService,
        sessions: Store,
        http: reqwest::Client,
        options: SsoOptions,
    ) -> Self {
        Self {
            connections,
            sessions,
            http,
            options,
        }
    }

    /// Validation that must complete before any redirect is possible.
    #[instrument(skip(self, request))]
    pub async fn resolve(&self, request: &AuthorizeRequest) -> SsoResult<ResolvedAuthorize> {
        let state = request
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SsoError::InvalidRequest(
                    "state is required to safely return the response".to_string(),
                )
            })?
            .to_string();

        let connection = self.resolve_connection(request).await?;

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SsoError::InvalidRedirectUri("redirect_uri is required".to_string()))?;
        if !connection.is_redirect_allowed(redirect_uri) {
            return Err(SsoError::InvalidRedirectUri(
                "redirect_uri is not on the connection's allow-list".to_string(),
            ));
        }

        Ok(ResolvedAuthorize {
            connection,
            redirect_uri: redirect_uri.to_string(),
            state,
        })
    }

    /// Find the connection the request addresses.
    ///
    /// The `tenant=...&product=...` selector is looked for in `client_id`,
    /// then `access_type`, then `resource`, then each whitespace-separated
    /// `scope` element. A `client_id` carrying no selector is treated as a
    /// minted identifier.
    async fn resolve_connection(&self, request: &AuthorizeRequest) -> SsoResult<Connection> {
        let client_id = request.client_id.as_deref().unwrap_or_default();
        if client_id.is_empty() {
            return Err(SsoError::InvalidClient("client_id is required".to_string()));
        }

        let selector = decode_tenant_product(client_id)
            .or_else(|| {
                request
                    .access_type
                    .as_deref()
                    .and_then(decode_tenant_product)
            })
            .or_else(|| request.resource.as_deref().and_then(decode_tenant_product))
            .or_else(|| {
                request
                    .scope
                    .as_deref()
                    .and_then(|scope| scope.split_whitespace().find_map(decode_tenant_product))
            });

        let Some((tenant, product)) = selector else {
            return self.connections.get(client_id).await?.ok_or_else(|| {
                SsoError::InvalidClient("no connection found for this client_id".to_string())
            });
        };

        let mut candidates = self.connections.by_tenant_product(&tenant, &product).await?;
        match candidates.len() {
            0 => Err(SsoError::InvalidClient(
                "no connection found for the requested tenant and product".to_string(),
            )),
            1 => Ok(candidates.remove(0)),
            _ => {
                if let Some(hint) = request.idp_hint.as_deref().filter(|h| !h.is_empty()) {
                    candidates
                        .into_iter()
                        .find(|c| c.client_id == hint)
                        .ok_or_else(|| {
                            SsoError::InvalidClient(
                                "idp_hint does not match any connection for this tenant and product"
                                    .to_string(),
                            )
                        })
                } else {
                    Err(SsoError::InvalidRequest(
                        "multiple connections match; provide idp_hint with the connection client_id"
                            .to_string(),
                    ))
                }
            }
        }
    }

    /// Remaining validation plus the upstream hand-off. The login session
    /// is persisted before the browser leaves.
    #[instrument(skip(self, request, resolved), fields(connection = %resolved.connection.client_id))]
    pub async fn initiate(
        &self,
        request: &AuthorizeRequest,
        resolved: &ResolvedAuthorize,
    ) -> SsoResult<AuthorizeAction> {
        let response_type = request.response_type.as_deref().unwrap_or("code");
        if response_type != "code" {
            return Err(SsoError::UnsupportedResponseType(response_type.to_string()));
        }

        if request.code_challenge.is_some() {
            // RFC 7636 defaults an absent method to `plain`, which we do
            // not accept.
            match request.code_challenge_method.as_deref() {
                Some("S256") => {}
                _ => {
                    return Err(SsoError::InvalidRequest(
                        "only the S256 code_challenge_method is supported".to_string(),
                    ));
                }
            }
        }

        let force_authn = request
            .prompt
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|v| v == "login"));

        let mut session_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut session_bytes);
        let mut session = LoginSession {
            id: format!("{SESSION_ID_PREFIX}{}", hex::encode(session_bytes)),
            connection_client_id: resolved.connection.client_id.clone(),
            tenant: resolved.connection.tenant.clone(),
            product: resolved.connection.product.clone(),
            redirect_uri: resolved.redirect_uri.clone(),
            state: resolved.state.clone(),
            scope: request.scope.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request
                .code_challenge
                .is_some()
                .then(|| "S256".to_string()),
            force_authn,
            saml_request_id: None,
            oidc_nonce: None,
            oidc_code_verifier: None,
        };

        match &resolved.connection.idp {
            IdpConfig::Saml(saml) => {
                // Prefer the Redirect binding, fall back to POST.
                if let Some(sso_url) = &saml.sso_redirect_url {
                    let authn = build_authn_request(
                        &self.options.saml_audience,
                        sso_url,
                        &self.options.acs_url(),
                        force_authn,
                    );
                    session.saml_request_id = Some(authn.id.clone());
                    self.sessions.put(&session.id, &session, &[]).await?;
                    let url = redirect_binding_url(sso_url, &authn.xml, &session.id)?;
                    info!(binding = "redirect", "saml login initiated");
                    Ok(AuthorizeAction::Redirect(url))
                } else if let Some(sso_url) = &saml.sso_post_url {
                    let authn = build_authn_request(
                        &self.options.saml_audience,
                        sso_url,
                        &self.options.acs_url(),
                        force_authn,
                    );
                    session.saml_request_id = Some(authn.id.clone());
                    self.sessions.put(&session.id, &session, &[]).await?;
                    let html = post_binding_form(sso_url, &authn.xml, &session.id);
                    info!(binding = "post", "saml login initiated");
                    Ok(AuthorizeAction::HtmlForm(html))
                } else {
                    Err(SsoError::InvalidRequest(
                        "connection metadata advertises no SSO binding".to_string(),
                    ))
                }
            }
            IdpConfig::Oidc(oidc) => {
                let discovery = fetch_discovery(&self.http, &oidc.discovery_url).await?;

                let nonce = generate_opaque_token();
                let verifier = pkce::generate_verifier();
                let challenge = pkce::code_challenge_s256(&verifier);
                session.oidc_nonce = Some(nonce.clone());
                session.oidc_code_verifier = Some(verifier);
                self.sessions.put(&session.id, &session, &[]).await?;

                let mut url =
                    Url::parse(&discovery.authorization_endpoint).map_err(|e| {
                        SsoError::UpstreamUnavailable(format!(
                            "discovery document carries an invalid authorization_endpoint: {e}"
                        ))
                    })?;
                url.query_pairs_mut()
                    .append_pair("response_type", "code")
                    .append_pair("client_id", &oidc.client_id)
                    .append_pair("redirect_uri", &self.options.oidc_callback_url())
                    .append_pair("scope", UPSTREAM_OIDC_SCOPE)
                    .append_pair("state", &session.id)
                    .append_pair("nonce", &nonce)
                    .append_pair("code_challenge", &challenge)
                    .append_pair("code_challenge_method", "S256");
                if force_authn {
                    url.query_pairs_mut().append_pair("prompt", "login");
                }
                info!("oidc login initiated");
                Ok(AuthorizeAction::Redirect(url.to_string()))
            }
        }
    }
}

/// Parse a `tenant=...&product=...` selector. Handles the selector
/// arriving percent-encoded one extra time, in which case it reads as a
/// single key with an empty value.
pub(crate) fn decode_tenant_product(value: &str) -> Option<(String, String)> {
    fn parse_pairs(value: &str) -> Option<(String, String)> {
        let mut tenant = None;
        let mut product = None;
        for (key, val) in url::form_urlencoded::parse(value.as_bytes()) {
            match key.as_ref() {
                "tenant" => tenant = Some(val.into_owned()),
                "product" => product = Some(val.into_owned()),
                _ => {}
            }
        }
        match (tenant, product) {
            (Some(t), Some(p)) if !t.is_empty() && !p.is_empty() => Some((t, p)),
            _ => None,
        }
    }

    if let Some(found) = parse_pairs(value) {
        return Some(found);
    }
    let pairs: Vec<_> = url::form_urlencoded::parse(value.as_bytes()).collect();
    if let [(key, val)] = pairs.as_slice() {
        if val.is_empty() && key != value && key.contains("tenant=") {
            return parse_pairs(key);
        }
    }
    None
}
