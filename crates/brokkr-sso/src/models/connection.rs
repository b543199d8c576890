//! SSO connection configuration.
//!
//! A connection binds one `(tenant, product)` pair to one upstream identity
//! provider. The broker mints the OAuth2 `client_id`/`client_secret` pair at
//! creation time; the secret is returned exactly once.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Upstream identity provider configuration. Exactly one protocol per
/// connection, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum IdpConfig {
    Saml(SamlIdp),
    Oidc(OidcIdp),
}

impl IdpConfig {
    /// Wire name of the protocol ("saml" or "oidc").
    #[must_use]
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Saml(_) => "saml",
            Self::Oidc(_) => "oidc",
        }
    }
}

/// SAML IdP endpoints and trust anchors, extracted from the IdP metadata
/// document at connection-creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SamlIdp {
    /// IdP `entityID` from the metadata.
    pub entity_id: String,
    /// SingleSignOnService location for the HTTP-Redirect binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_redirect_url: Option<String>,
    /// SingleSignOnService location for the HTTP-POST binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_post_url: Option<String>,
    /// Base64 DER signing certificates advertised by the IdP.
    pub certificates: Vec<String>,
}

/// Upstream OIDC provider coordinates. The provider endpoints are resolved
/// from the discovery document at authorization time, not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OidcIdp {
    /// Discovery document URL or issuer base URL.
    pub discovery_url: String,
    /// Client ID registered with the upstream provider.
    pub client_id: String,
    /// Client secret registered with the upstream provider.
    pub client_secret: String,
}

/// A persisted SSO connection.
///
/// Stored under the minted `client_id` and secondary-indexed by
/// `tenant:product` and, for SAML, by the IdP `entityID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Connection {
    /// Broker-minted OAuth2 client identifier. Also the storage key.
    pub client_id: String,
    /// Broker-minted OAuth2 client secret.
    pub client_secret: String,
    pub tenant: String,
    pub product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Redirect target used when a login did not originate at the SP.
    pub default_redirect_url: String,
    /// Allow-list of SP redirect URIs, matched byte for byte.
    pub redirect_urls: Vec<String>,
    pub idp: IdpConfig,
}

impl Connection {
    /// Whether `uri` is an acceptable SP redirect target. Exact string
    /// comparison against the default URL and the allow-list, no prefix or
    /// wildcard matching.
    #[must_use]
    pub fn is_redirect_allowed(&self, uri: &str) -> bool {
        self.default_redirect_url == uri || self.redirect_urls.iter().any(|u| u == uri)
    }

    /// Composite index value, `{tenant}:{product}`.
    #[must_use]
    pub fn tenant_product(&self) -> String {
        format!("{}:{}", self.tenant, self.product)
    }
}

/// Request body for creating a connection.
///
/// The IdP protocol is inferred from which fields are present: one of
/// `raw_metadata`/`encoded_raw_metadata` selects SAML, `oidc_discovery_url`
/// (with client credentials) selects OIDC. Supplying both or neither is an
/// error.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateConnectionRequest {
    #[validate(length(min = 1, message = "tenant must not be empty"))]
    pub tenant: String,
    #[validate(length(min = 1, message = "product must not be empty"))]
    pub product: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "default_redirect_url must be a valid URL"))]
    pub default_redirect_url: String,
    /// Allow-listed SP redirect URIs. At least one entry is required.
    #[serde(default)]
    pub redirect_urls: Vec<String>,
    /// SAML IdP metadata XML, as-is.
    pub raw_metadata: Option<String>,
    /// SAML IdP metadata XML, base64-encoded.
    pub encoded_raw_metadata: Option<String>,
    /// OIDC discovery document URL or issuer base URL.
    #[validate(url(message = "oidc_discovery_url must be a valid URL"))]
    pub oidc_discovery_url: Option<String>,
    /// Client ID registered with the upstream OIDC provider.
    pub oidc_client_id: Option<String>,
    /// Client secret registered with the upstream OIDC provider.
    pub oidc_client_secret: Option<String>,
}

/// Request body for updating a connection. Absent fields are left alone;
/// tenant, product and the minted credentials are immutable.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateConnectionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "default_redirect_url must be a valid URL"))]
    pub default_redirect_url: Option<String>,
    pub redirect_urls: Option<Vec<String>>,
    /// Replacement SAML metadata. Rejected on OIDC connections.
    pub raw_metadata: Option<String>,
    /// Replacement SAML metadata, base64-encoded. Rejected on OIDC
    /// connections.
    pub encoded_raw_metadata: Option<String>,
}

/// Public view of a connection. The client secret is never included.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionSummary {
    pub client_id: String,
    pub tenant: String,
    pub product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub default_redirect_url: String,
    pub redirect_urls: Vec<String>,
    /// "saml" or "oidc".
    pub protocol: String,
    /// SAML only: the IdP `entityID`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl From<&Connection> for ConnectionSummary {
    fn from(connection: &Connection) -> Self {
        let entity_id = match &connection.idp {
            IdpConfig::Saml(saml) => Some(saml.entity_id.clone()),
            IdpConfig::Oidc(_) => None,
        };
        Self {
            client_id: connection.client_id.clone(),
            tenant: connection.tenant.clone(),
            product: connection.product.clone(),
            name: connection.name.clone(),
            description: connection.description.clone(),
            default_redirect_url: connection.default_redirect_url.clone(),
            redirect_urls: connection.redirect_urls.clone(),
            protocol: connection.idp.protocol().to_string(),
            entity_id,
        }
    }
}

/// Creation response. The only place the client secret appears.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionCreated {
    #[serde(flatten)]
    pub connection: ConnectionSummary,
    pub client_secret: String,
}
