//! HTTP handlers for the broker endpoints.

pub mod authorize;
pub mod connections;
pub mod oidc;
pub mod saml;
pub mod token;
pub mod userinfo;

pub use authorize::authorize_handler;
pub use connections::{
    create_connection_handler, delete_connection_handler, get_connection_handler,
    list_connections_handler, update_connection_handler,
};
pub use oidc::oidc_callback_handler;
pub use saml::saml_acs_handler;
pub use token::token_handler;
pub use userinfo::userinfo_handler;

use axum::response::{IntoResponse, Redirect, Response};
use url::Url;

use crate::error::SsoError;

/// Report a failure to the SP with an OAuth2 error redirect.
///
/// Only called with a redirect target that was validated against the
/// connection's allow-list; failures before that validation are rendered
/// directly and never redirect. Upstream IdP error codes pass through
/// unchanged so the SP sees what the IdP said.
pub(crate) fn error_redirect(redirect_uri: &str, state: &str, error: &SsoError) -> Response {
    let Ok(mut url) = Url::parse(redirect_uri) else {
        return error.into_response();
    };

    let (code, description) = match error {
        SsoError::UpstreamAuthFailed { error, description } => {
            (error.clone(), description.clone())
        }
        other => (other.error_code().to_string(), other.to_string()),
    };

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", &code);
        if !description.is_empty() {
            pairs.append_pair("error_description", &description);
        }
        if !state.is_empty() {
            pairs.append_pair("state", state);
        }
    }
    Redirect::temporary(url.as_str()).into_response()
}
