//! Integration tests for the API-key-guarded connection CRUD endpoints.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

mod common;
use common::{
    app, body_json, create_saml_connection, idp_metadata, test_state, ADMIN_KEY, ENTITY_ID,
    SP_REDIRECT,
};

async fn admin_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Api-Key {ADMIN_KEY}"));
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_admin_api_requires_a_valid_key() {
    let app = app(test_state());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/connections?tenant=acme.com&product=crm")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/connections?tenant=acme.com&product=crm")
                .header(header::AUTHORIZATION, "Api-Key wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_fetch_connection() {
    let app = app(test_state());

    let created = create_saml_connection(&app, "acme.com", "crm").await;
    let client_id = created["client_id"].as_str().unwrap();
    assert!(!created["client_secret"].as_str().unwrap().is_empty());
    assert_eq!(created["protocol"], "saml");
    assert_eq!(created["entity_id"], ENTITY_ID);

    // The summary never carries the secret.
    let response = admin_request(
        &app,
        "GET",
        &format!("/api/v1/connections/{client_id}"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["client_id"], client_id);
    assert_eq!(summary["tenant"], "acme.com");
    assert!(summary.get("client_secret").is_none());

    let response = admin_request(
        &app,
        "GET",
        "/api/v1/connections?tenant=acme.com&product=crm",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_rewrites_redirect_policy() {
    let app = app(test_state());
    let created = create_saml_connection(&app, "acme.com", "crm").await;
    let client_id = created["client_id"].as_str().unwrap();

    let response = admin_request(
        &app,
        "PATCH",
        &format!("/api/v1/connections/{client_id}"),
        Some(serde_json::json!({
            "name": "Acme production",
            "redirect_urls": [SP_REDIRECT, "https://sp.example.com/alt"],
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["name"], "Acme production");
    assert_eq!(updated["redirect_urls"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_removes_connection_and_indexes() {
    let app = app(test_state());
    let created = create_saml_connection(&app, "acme.com", "crm").await;
    let client_id = created["client_id"].as_str().unwrap();

    let response = admin_request(
        &app,
        "DELETE",
        &format!("/api/v1/connections/{client_id}"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = admin_request(
        &app,
        "GET",
        &format!("/api/v1/connections/{client_id}"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = admin_request(
        &app,
        "GET",
        "/api/v1/connections?tenant=acme.com&product=crm",
        None,
    )
    .await;
    let list = body_json(response).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_rejects_ambiguous_protocol() {
    let app = app(test_state());

    let response = admin_request(
        &app,
        "POST",
        "/api/v1/connections",
        Some(serde_json::json!({
            "tenant": "acme.com",
            "product": "crm",
            "default_redirect_url": SP_REDIRECT,
            "redirect_urls": [SP_REDIRECT],
            "raw_metadata": idp_metadata(ENTITY_ID),
            "oidc_discovery_url": "https://op.example.com",
            "oidc_client_id": "x",
            "oidc_client_secret": "y",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_requires_a_selector() {
    let app = app(test_state());

    let response = admin_request(&app, "GET", "/api/v1/connections", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_request");
}
