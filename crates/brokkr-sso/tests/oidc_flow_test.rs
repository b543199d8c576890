//! End-to-end OIDC flow against a mocked upstream provider.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{
    app, body_json, create_oidc_connection, location_header, query_pairs, test_state, urlencode,
    SP_REDIRECT,
};

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(app: &Router, uri: &str, form: String) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
        })))
        .mount(server)
        .await;
}

fn id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Authorize against the OIDC connection and return the upstream redirect
/// parameters (session state, nonce, ...).
async fn start_login(app: &Router, server: &MockServer) -> std::collections::HashMap<String, String> {
    let uri = format!(
        "/authorize?client_id={}&state=sp-state&redirect_uri={}",
        urlencode("tenant=acme.com&product=crm"),
        urlencode(SP_REDIRECT),
    );
    let response = get(app, &uri).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = location_header(&response);
    assert!(location.starts_with(&format!("{}/authorize?", server.uri())));
    query_pairs(&location)
}

#[tokio::test]
async fn test_full_oidc_login_issues_code_and_token() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let app = app(test_state());
    let created = create_oidc_connection(&app, "acme.com", "crm", &server.uri()).await;
    let upstream = start_login(&app, &server).await;

    // The upstream redirect carries everything the provider needs.
    assert_eq!(upstream["response_type"], "code");
    assert_eq!(upstream["client_id"], "upstream-client");
    assert_eq!(upstream["scope"], "openid email profile");
    assert_eq!(upstream["code_challenge_method"], "S256");
    let session_state = upstream["state"].clone();
    assert!(session_state.starts_with("brokkr_sso_"));

    // The provider will answer the code exchange with an ID token bound
    // to the nonce it was just shown.
    let claims = serde_json::json!({
        "iss": server.uri(),
        "aud": "upstream-client",
        "sub": "user-42",
        "email": "u@acme.com",
        "given_name": "Ursula",
        "nonce": upstream["nonce"],
    });
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=upstream-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "upstream-access",
            "id_token": id_token(&claims),
        })))
        .mount(&server)
        .await;

    let callback = format!(
        "/oidc/callback?code=upstream-code&state={}",
        urlencode(&session_state)
    );
    let response = get(&app, &callback).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = location_header(&response);
    assert!(location.starts_with(SP_REDIRECT));
    let pairs = query_pairs(&location);
    assert_eq!(pairs["state"], "sp-state");
    let code = pairs["code"].clone();

    // Broker code exchange works exactly as in the SAML flow.
    let token_form = format!(
        "grant_type=authorization_code&code={}&redirect_uri={}&client_id={}&client_secret={}",
        urlencode(&code),
        urlencode(SP_REDIRECT),
        urlencode(created["client_id"].as_str().unwrap()),
        urlencode(created["client_secret"].as_str().unwrap()),
    );
    let response = post_form(&app, "/token", token_form).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["profile"]["id"], "user-42");
    assert_eq!(body["profile"]["email"], "u@acme.com");
    assert_eq!(body["profile"]["first_name"], "Ursula");
}

#[tokio::test]
async fn test_upstream_error_redirects_to_sp_without_minting_a_code() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let app = app(test_state());
    create_oidc_connection(&app, "acme.com", "crm", &server.uri()).await;
    let upstream = start_login(&app, &server).await;

    let callback = format!(
        "/oidc/callback?error=access_denied&error_description=user+cancelled&state={}",
        urlencode(&upstream["state"])
    );
    let response = get(&app, &callback).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = location_header(&response);
    assert!(location.starts_with(SP_REDIRECT));
    let pairs = query_pairs(&location);
    assert_eq!(pairs["error"], "access_denied");
    assert_eq!(pairs["state"], "sp-state");
    assert!(!pairs.contains_key("code"));
}

#[tokio::test]
async fn test_callback_without_session_is_rejected_directly() {
    let app = app(test_state());

    let response = get(&app, "/oidc/callback?code=x&state=brokkr_sso_unknown").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_request");

    let response = get(&app, "/oidc/callback?code=x").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_is_single_use_across_callbacks() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let app = app(test_state());
    create_oidc_connection(&app, "acme.com", "crm", &server.uri()).await;
    let upstream = start_login(&app, &server).await;

    let callback = format!(
        "/oidc/callback?error=access_denied&state={}",
        urlencode(&upstream["state"])
    );
    let first = get(&app, &callback).await;
    assert_eq!(first.status(), StatusCode::TEMPORARY_REDIRECT);

    // The session was consumed by the first callback; a replay cannot
    // resolve a redirect target and fails directly.
    let second = get(&app, &callback).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}
