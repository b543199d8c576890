//! `OpenAPI` documentation served at `/openapi.json`.

use axum::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::health::{LivenessResponse, ReadinessResponse};

/// Registers the two authentication schemes: bearer tokens for userinfo
/// and the `Authorization: Api-Key <key>` header for the admin API.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::new);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Access token minted by POST /token"))
                    .build(),
            ),
        );
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "Authorization",
                "Admin key presented as `Authorization: Api-Key <key>`",
            ))),
        );
    }
}

/// `OpenAPI` documentation for the broker API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "brokkr API",
        version = "0.1.0",
        description = "OAuth2-shaped SSO broker delegating logins to tenant SAML and OIDC IdPs"
    ),
    paths(
        brokkr_sso::handlers::authorize::authorize_handler,
        brokkr_sso::handlers::saml::saml_acs_handler,
        brokkr_sso::handlers::oidc::oidc_callback_handler,
        brokkr_sso::handlers::token::token_handler,
        brokkr_sso::handlers::userinfo::userinfo_handler,
        brokkr_sso::handlers::connections::create_connection_handler,
        brokkr_sso::handlers::connections::list_connections_handler,
        brokkr_sso::handlers::connections::get_connection_handler,
        brokkr_sso::handlers::connections::update_connection_handler,
        brokkr_sso::handlers::connections::delete_connection_handler,
        crate::health::healthz_handler,
        crate::health::readyz_handler,
    ),
    components(schemas(
        brokkr_sso::models::ConnectionSummary,
        brokkr_sso::models::ConnectionCreated,
        brokkr_sso::models::CreateConnectionRequest,
        brokkr_sso::models::UpdateConnectionRequest,
        brokkr_sso::models::TokenRequest,
        brokkr_sso::models::TokenResponse,
        brokkr_sso::models::SamlAcsForm,
        brokkr_sso::models::Profile,
        brokkr_sso::models::UserInfoResponse,
        brokkr_sso::SsoErrorResponse,
        LivenessResponse,
        ReadinessResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "SSO", description = "Authorize, callback, token and userinfo endpoints"),
        (name = "Connections", description = "Connection administration"),
        (name = "Health", description = "Service health probes"),
    )
)]
pub struct ApiDoc;

/// Serve the generated document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/authorize"));
        assert!(json.contains("/token"));
        assert!(json.contains("/api/v1/connections"));
        assert!(json.contains("/healthz"));
    }

    #[test]
    fn test_security_schemes_registered() {
        let doc = ApiDoc::openapi();
        let schemes = doc
            .components
            .as_ref()
            .map(|c| c.security_schemes.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        assert!(schemes.contains(&"bearer".to_string()));
        assert!(schemes.contains(&"api_key".to_string()));
    }
}
