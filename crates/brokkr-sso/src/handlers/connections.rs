//! Admin CRUD handlers for SSO connections.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::instrument;

use crate::error::{SsoError, SsoResult};
use crate::models::{
    ConnectionCreated, ConnectionQuery, ConnectionSummary, CreateConnectionRequest,
    UpdateConnectionRequest,
};
use crate::router::SsoState;

/// Create a connection from SAML metadata or OIDC provider coordinates.
#[utoipa::path(
    post,
    path = "/api/v1/connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created; the only response carrying the client secret", body = ConnectionCreated),
        (status = 400, description = "Validation failed"),
    ),
    security(("api_key" = [])),
    tag = "Connections"
)]
#[instrument(skip(state, request))]
pub async fn create_connection_handler(
    State(state): State<SsoState>,
    Json(request): Json<CreateConnectionRequest>,
) -> SsoResult<(StatusCode, Json<ConnectionCreated>)> {
    let connection = state.connections.create(request).await?;
    let response = ConnectionCreated {
        connection: ConnectionSummary::from(&connection),
        client_secret: connection.client_secret.clone(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// List connections for a tenant/product pair, or look one up by its
/// minted client id.
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    params(ConnectionQuery),
    responses(
        (status = 200, description = "Matching connections, secrets omitted", body = [ConnectionSummary]),
        (status = 400, description = "Neither a tenant/product pair nor a client_id was given"),
    ),
    security(("api_key" = [])),
    tag = "Connections"
)]
#[instrument(skip(state, query))]
pub async fn list_connections_handler(
    State(state): State<SsoState>,
    Query(query): Query<ConnectionQuery>,
) -> SsoResult<Json<Vec<ConnectionSummary>>> {
    if let Some(client_id) = query.client_id.as_deref().filter(|c| !c.is_empty()) {
        let summaries = state
            .connections
            .get(client_id)
            .await?
            .map(|c| vec![ConnectionSummary::from(&c)])
            .unwrap_or_default();
        return Ok(Json(summaries));
    }

    match (query.tenant.as_deref(), query.product.as_deref()) {
        (Some(tenant), Some(product)) if !tenant.is_empty() && !product.is_empty() => {
            let connections = state.connections.by_tenant_product(tenant, product).await?;
            Ok(Json(
                connections.iter().map(ConnectionSummary::from).collect(),
            ))
        }
        _ => Err(SsoError::InvalidRequest(
            "tenant and product, or client_id, are required".to_string(),
        )),
    }
}

/// Fetch a single connection.
#[utoipa::path(
    get,
    path = "/api/v1/connections/{client_id}",
    params(("client_id" = String, Path, description = "Minted client identifier")),
    responses(
        (status = 200, description = "The connection, secret omitted", body = ConnectionSummary),
        (status = 404, description = "No such connection"),
    ),
    security(("api_key" = [])),
    tag = "Connections"
)]
#[instrument(skip(state))]
pub async fn get_connection_handler(
    State(state): State<SsoState>,
    Path(client_id): Path<String>,
) -> SsoResult<Json<ConnectionSummary>> {
    let connection = state.connections.get(&client_id).await?.ok_or_else(|| {
        SsoError::NotFound(format!("no connection with client_id {client_id}"))
    })?;
    Ok(Json(ConnectionSummary::from(&connection)))
}

/// Update a connection's redirect policy, metadata or labels. Tenant,
/// product and the minted credentials are immutable.
#[utoipa::path(
    patch,
    path = "/api/v1/connections/{client_id}",
    params(("client_id" = String, Path, description = "Minted client identifier")),
    request_body = UpdateConnectionRequest,
    responses(
        (status = 200, description = "Updated connection", body = ConnectionSummary),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "No such connection"),
    ),
    security(("api_key" = [])),
    tag = "Connections"
)]
#[instrument(skip(state, request))]
pub async fn update_connection_handler(
    State(state): State<SsoState>,
    Path(client_id): Path<String>,
    Json(request): Json<UpdateConnectionRequest>,
) -> SsoResult<Json<ConnectionSummary>> {
    let connection = state.connections.update(&client_id, request).await?;
    Ok(Json(ConnectionSummary::from(&connection)))
}

/// Delete a connection. Idempotent; in-flight login sessions simply
/// expire on their own.
#[utoipa::path(
    delete,
    path = "/api/v1/connections/{client_id}",
    params(("client_id" = String, Path, description = "Minted client identifier")),
    responses(
        (status = 204, description = "Connection deleted"),
    ),
    security(("api_key" = [])),
    tag = "Connections"
)]
#[instrument(skip(state))]
pub async fn delete_connection_handler(
    State(state): State<SsoState>,
    Path(client_id): Path<String>,
) -> SsoResult<StatusCode> {
    state.connections.delete(&client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
