//! Authorization endpoint handler.

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::instrument;

use crate::handlers::error_redirect;
use crate::models::AuthorizeRequest;
use crate::router::SsoState;
use crate::services::AuthorizeAction;

/// Start an SP-initiated login.
///
/// Validation runs in two phases. Until the connection is resolved and the
/// `redirect_uri` checked against its allow-list, failures are answered
/// directly as JSON so attacker-supplied targets are never redirected to.
/// After that point failures go back to the SP as OAuth2 error redirects.
#[utoipa::path(
    get,
    path = "/authorize",
    params(AuthorizeRequest),
    responses(
        (status = 307, description = "Redirect to the upstream IdP, or back to the SP with an error"),
        (status = 200, description = "Self-submitting HTML form for the SAML HTTP-POST binding"),
        (status = 400, description = "Request rejected before a safe redirect target was known"),
        (status = 401, description = "Unknown client or tenant/product"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, request))]
pub async fn authorize_handler(
    State(state): State<SsoState>,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let resolved = match state.authorize.resolve(&request).await {
        Ok(resolved) => resolved,
        Err(error) => return error.into_response(),
    };

    match state.authorize.initiate(&request, &resolved).await {
        Ok(AuthorizeAction::Redirect(url)) => Redirect::temporary(&url).into_response(),
        Ok(AuthorizeAction::HtmlForm(html)) => Html(html).into_response(),
        Err(error) => error_redirect(&resolved.redirect_uri, &resolved.state, &error),
    }
}
