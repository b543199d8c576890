//! Assertion consumer service handler for SAML responses.

use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use tracing::instrument;

use crate::handlers::error_redirect;
use crate::models::SamlAcsForm;
use crate::router::SsoState;

/// Consume a SAML response posted by the IdP.
///
/// A RelayState minted by this broker is consumed first; if it cannot be
/// found the request fails before any redirect target exists and is
/// answered directly. Once a session is in hand its stored `redirect_uri`
/// is the verified error target.
#[utoipa::path(
    post,
    path = "/saml/acs",
    request_body(content = SamlAcsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 307, description = "Redirect to the SP with an authorization code or an error"),
        (status = 400, description = "Response rejected before a safe redirect target was known"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, form))]
pub async fn saml_acs_handler(
    State(state): State<SsoState>,
    Form(form): Form<SamlAcsForm>,
) -> Response {
    let session = match state.saml_acs.take_session(form.relay_state.as_deref()).await {
        Ok(session) => session,
        Err(error) => return error.into_response(),
    };

    match state.saml_acs.process(&form, session.as_ref()).await {
        Ok(url) => Redirect::temporary(&url).into_response(),
        // IdP-initiated failures have no SP request to report back to.
        Err(error) => match &session {
            Some(session) => error_redirect(&session.redirect_uri, &session.state, &error),
            None => error.into_response(),
        },
    }
}
