//! Callback handler for upstream OIDC providers.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use tracing::instrument;

use crate::handlers::error_redirect;
use crate::models::OidcCallbackQuery;
use crate::router::SsoState;

/// Consume the provider redirect carrying `code`/`state` or an error.
///
/// The `state` parameter is the broker's session id; without it there is
/// no verified redirect target, so those failures render directly. With a
/// session in hand, failures (including upstream `error` responses) are
/// forwarded to the SP's stored `redirect_uri`.
#[utoipa::path(
    get,
    path = "/oidc/callback",
    params(OidcCallbackQuery),
    responses(
        (status = 307, description = "Redirect to the SP with an authorization code or an error"),
        (status = 400, description = "Callback rejected before a safe redirect target was known"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, query))]
pub async fn oidc_callback_handler(
    State(state): State<SsoState>,
    Query(query): Query<OidcCallbackQuery>,
) -> Response {
    let session = match state.oidc_callback.take_session(query.state.as_deref()).await {
        Ok(session) => session,
        Err(error) => return error.into_response(),
    };

    match state.oidc_callback.process(&query, &session).await {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(error) => error_redirect(&session.redirect_uri, &session.state, &error),
    }
}
