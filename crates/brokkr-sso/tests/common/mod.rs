//! Shared helpers for broker integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use brokkr_sso::error::SsoResult;
use brokkr_sso::{admin_router, sso_router, SamlSignatureValidator, SsoOptions, SsoState};
use brokkr_store::Database;
use tower::ServiceExt;
use url::Url;

#[allow(dead_code)]
static INIT: Once = Once::new();

/// Initialize logging for tests (once).
#[allow(dead_code)]
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

#[allow(dead_code)]
pub const ADMIN_KEY: &str = "test-admin-key";

#[allow(dead_code)]
pub const ENTITY_ID: &str = "https://idp.example.com/saml";

#[allow(dead_code)]
pub const SP_REDIRECT: &str = "https://sp.example.com/done";

/// Accepts every signature. Integration tests exercise the broker's
/// session and code bookkeeping, not XML cryptography.
pub struct AcceptAllSignatures;

impl SamlSignatureValidator for AcceptAllSignatures {
    fn validate(&self, _response_xml: &str, _certificates: &[String]) -> SsoResult<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn test_options() -> SsoOptions {
    SsoOptions {
        admin_api_keys: vec![ADMIN_KEY.to_string()],
        ..SsoOptions::default()
    }
}

#[allow(dead_code)]
pub fn test_state() -> SsoState {
    init_test_logging();
    SsoState::new(Database::in_memory(), test_options())
        .with_signature_validator(Arc::new(AcceptAllSignatures))
}

/// Protocol routes at the root, admin routes under /api/v1, as the API
/// binary mounts them.
#[allow(dead_code)]
pub fn app(state: SsoState) -> Router {
    Router::new()
        .merge(sso_router(state.clone()))
        .nest("/api/v1", admin_router(state))
}

#[allow(dead_code)]
pub fn idp_metadata(entity_id: &str) -> String {
    format!(
        r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
  <IDPSSODescriptor>
    <KeyDescriptor use="signing"><KeyInfo><X509Data><X509Certificate>MIICsample</X509Certificate></X509Data></KeyInfo></KeyDescriptor>
    <SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/sso"/>
  </IDPSSODescriptor>
</EntityDescriptor>"#
    )
}

/// A signed-looking response document; the test validator accepts it.
#[allow(dead_code)]
pub fn saml_response_form(
    issuer: &str,
    audience: &str,
    in_response_to: Option<&str>,
    relay_state: Option<&str>,
) -> String {
    let in_response_to = in_response_to
        .map(|id| format!(" InResponseTo=\"{id}\""))
        .unwrap_or_default();
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1"{in_response_to} Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
  <saml:Issuer>{issuer}</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_a1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
    <saml:Issuer>{issuer}</saml:Issuer>
    <saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">jdoe@example.com</saml:NameID></saml:Subject>
    <saml:Conditions><saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction></saml:Conditions>
    <saml:AttributeStatement>
      <saml:Attribute Name="firstName"><saml:AttributeValue>Jo</saml:AttributeValue></saml:Attribute>
      <saml:Attribute Name="lastName"><saml:AttributeValue>Doe</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#
    );

    let mut form = format!(
        "SAMLResponse={}",
        urlencode(&STANDARD.encode(xml.as_bytes()))
    );
    if let Some(relay_state) = relay_state {
        form.push_str(&format!("&RelayState={}", urlencode(relay_state)));
    }
    form
}

#[allow(dead_code)]
pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn location_header(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect should carry a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

#[allow(dead_code)]
pub fn query_pairs(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Create a SAML connection through the admin API and return the creation
/// response (client_id, client_secret, ...).
#[allow(dead_code)]
pub async fn create_saml_connection(
    app: &Router,
    tenant: &str,
    product: &str,
) -> serde_json::Value {
    let body = serde_json::json!({
        "tenant": tenant,
        "product": product,
        "default_redirect_url": SP_REDIRECT,
        "redirect_urls": [SP_REDIRECT],
        "raw_metadata": idp_metadata(ENTITY_ID),
    });
    post_admin_json(app, "/api/v1/connections", &body, StatusCode::CREATED).await
}

/// Create an OIDC connection pointing at `discovery_url` through the
/// admin API.
#[allow(dead_code)]
pub async fn create_oidc_connection(
    app: &Router,
    tenant: &str,
    product: &str,
    discovery_url: &str,
) -> serde_json::Value {
    let body = serde_json::json!({
        "tenant": tenant,
        "product": product,
        "default_redirect_url": SP_REDIRECT,
        "redirect_urls": [SP_REDIRECT],
        "oidc_discovery_url": discovery_url,
        "oidc_client_id": "upstream-client",
        "oidc_client_secret": "upstream-secret",
    });
    post_admin_json(app, "/api/v1/connections", &body, StatusCode::CREATED).await
}

#[allow(dead_code)]
async fn post_admin_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
    expected: StatusCode,
) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Api-Key {ADMIN_KEY}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), expected);
    body_json(response).await
}
