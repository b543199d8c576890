//! Upstream OIDC provider discovery.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{SsoError, SsoResult};

/// Timeout for every outbound call to an upstream provider.
pub(crate) const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoints resolved from a provider's discovery document. Fetched per
/// login rather than stored on the connection, so provider-side endpoint
/// moves take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
}

/// Resolve the discovery document URL for a configured value. Accepts the
/// issuer base URL or an already-complete `.well-known` URL.
#[must_use]
pub fn well_known_url(configured: &str) -> String {
    let trimmed = configured.trim_end_matches('/');
    if trimmed.contains("/.well-known/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/.well-known/openid-configuration")
    }
}

/// Fetch and parse a provider's discovery document.
#[instrument(skip(http))]
pub async fn fetch_discovery(
    http: &reqwest::Client,
    discovery_url: &str,
) -> SsoResult<OidcDiscovery> {
    let url = well_known_url(discovery_url);
    let response = http
        .get(&url)
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await
        .map_err(|e| SsoError::UpstreamUnavailable(format!("discovery fetch failed: {e}")))?;

    if !response.status().is_success() {
        return Err(SsoError::UpstreamUnavailable(format!(
            "discovery endpoint returned {}",
            response.status()
        )));
    }

    response
        .json::<OidcDiscovery>()
        .await
        .map_err(|e| SsoError::UpstreamUnavailable(format!("invalid discovery document: {e}")))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_well_known_url() {
        assert_eq!(
            well_known_url("https://op.example.com"),
            "https://op.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            well_known_url("https://op.example.com/"),
            "https://op.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            well_known_url("https://op.example.com/.well-known/openid-configuration"),
            "https://op.example.com/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_fetch_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let discovery = fetch_discovery(&http, &server.uri()).await.unwrap();

        assert_eq!(discovery.issuer, server.uri());
        assert!(discovery.token_endpoint.ends_with("/token"));
        assert!(discovery.userinfo_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_discovery_error_status_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = fetch_discovery(&http, &server.uri()).await.unwrap_err();
        assert!(matches!(err, SsoError::UpstreamUnavailable(_)));
    }
}
