//! Router configuration and shared application state.
//!
//! Two routers are exposed:
//! - [`sso_router`] carries the protocol endpoints (`/authorize`,
//!   `/saml/acs`, `/oidc/callback`, `/token`, `/userinfo`) and is mounted
//!   at the root.
//! - [`admin_router`] carries the connection CRUD endpoints and is meant
//!   to be nested under `/api/v1`, guarded by the API-key middleware.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use brokkr_store::Database;

use crate::handlers::{
    authorize_handler, create_connection_handler, delete_connection_handler,
    get_connection_handler, list_connections_handler, oidc_callback_handler, saml_acs_handler,
    token_handler, update_connection_handler, userinfo_handler,
};
use crate::middleware::require_api_key;
use crate::saml::{SamlSignatureValidator, UnconfiguredValidator};
use crate::services::{
    AuthorizeService, ConnectionService, OidcCallbackService, SamlAcsService, TokenService,
};

/// Storage namespace for connections. No TTL; indexed by tenant/product
/// and entity id.
pub const NS_CONNECTION: &str = "sso:connection";
/// Storage namespace for in-flight login sessions.
pub const NS_SESSION: &str = "sso:session";
/// Storage namespace for single-use authorization codes.
pub const NS_CODE: &str = "oauth:code";
/// Storage namespace for access tokens.
pub const NS_TOKEN: &str = "oauth:token";

/// Broker tunables.
#[derive(Debug, Clone)]
pub struct SsoOptions {
    /// Public base URL of this broker. Used to build the ACS and OIDC
    /// callback URLs presented upstream.
    pub external_url: String,
    /// Audience expected in SAML assertions addressed to this broker.
    pub saml_audience: String,
    /// Login session lifetime in seconds.
    pub session_ttl: u64,
    /// Authorization code lifetime in seconds.
    pub code_ttl: u64,
    /// Access token lifetime in seconds.
    pub token_ttl: u64,
    /// Whether SAML responses without a broker session are accepted.
    pub idp_initiated_enabled: bool,
    /// Keys accepted by the admin connection API.
    pub admin_api_keys: Vec<String>,
}

impl Default for SsoOptions {
    fn default() -> Self {
        Self {
            external_url: "http://localhost:5225".to_string(),
            saml_audience: "https://saml.brokkr.dev".to_string(),
            session_ttl: 300,
            code_ttl: 300,
            token_ttl: 300,
            idp_initiated_enabled: false,
            admin_api_keys: Vec::new(),
        }
    }
}

impl SsoOptions {
    /// ACS URL advertised to SAML IdPs.
    pub(crate) fn acs_url(&self) -> String {
        format!("{}/saml/acs", self.external_url.trim_end_matches('/'))
    }

    /// Redirect URL registered with upstream OIDC providers.
    pub(crate) fn oidc_callback_url(&self) -> String {
        format!("{}/oidc/callback", self.external_url.trim_end_matches('/'))
    }
}

/// Application state for the broker routes.
#[derive(Clone)]
pub struct SsoState {
    /// Storage handle the services were built over.
    pub db: Database,
    pub connections: ConnectionService,
    pub authorize: AuthorizeService,
    pub saml_acs: SamlAcsService,
    pub oidc_callback: OidcCallbackService,
    pub token: TokenService,
    pub options: SsoOptions,
}

impl SsoState {
    /// Wire the broker services over `db`.
    ///
    /// SAML signature validation starts in the fail-closed state; install
    /// a real validator with [`Self::with_signature_validator`] before
    /// serving SAML connections.
    #[must_use]
    pub fn new(db: Database, options: SsoOptions) -> Self {
        Self::build(db, options, Arc::new(UnconfiguredValidator))
    }

    /// Replace the SAML signature validator, rebuilding the services that
    /// hold it.
    #[must_use]
    pub fn with_signature_validator(self, validator: Arc<dyn SamlSignatureValidator>) -> Self {
        Self::build(self.db, self.options, validator)
    }

    fn build(
        db: Database,
        options: SsoOptions,
        validator: Arc<dyn SamlSignatureValidator>,
    ) -> Self {
        let http = reqwest::Client::new();
        let connections = ConnectionService::new(db.store(NS_CONNECTION, 0));
        let sessions = db.store(NS_SESSION, options.session_ttl);
        let codes = db.store(NS_CODE, options.code_ttl);
        let tokens = db.store(NS_TOKEN, options.token_ttl);

        let authorize = AuthorizeService::new(
            connections.clone(),
            sessions.clone(),
            http.clone(),
            options.clone(),
        );
        let saml_acs = SamlAcsService::new(
            connections.clone(),
            sessions.clone(),
            codes.clone(),
            validator,
            options.clone(),
        );
        let oidc_callback = OidcCallbackService::new(
            connections.clone(),
            sessions,
            codes.clone(),
            http,
            options.clone(),
        );
        let token = TokenService::new(connections.clone(), codes, tokens, options.clone());

        Self {
            db,
            connections,
            authorize,
            saml_acs,
            oidc_callback,
            token,
            options,
        }
    }
}

/// Protocol endpoints, mounted at the root.
pub fn sso_router(state: SsoState) -> Router {
    Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/saml/acs", post(saml_acs_handler))
        .route("/oidc/callback", get(oidc_callback_handler))
        .route("/token", post(token_handler))
        .route("/userinfo", get(userinfo_handler).post(userinfo_handler))
        .with_state(state)
}

/// Connection CRUD endpoints, guarded by the admin API key. Nest under
/// `/api/v1`.
pub fn admin_router(state: SsoState) -> Router {
    Router::new()
        .route("/connections", get(list_connections_handler))
        .route("/connections", post(create_connection_handler))
        .route("/connections/:client_id", get(get_connection_handler))
        .route("/connections/:client_id", patch(update_connection_handler))
        .route("/connections/:client_id", delete(delete_connection_handler))
        .layer(from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}
