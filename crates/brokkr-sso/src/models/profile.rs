//! Authenticated user profile.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User identity extracted from the upstream IdP response.
///
/// The normalized fields cover the common attribute names; everything the
/// IdP sent is preserved untouched in `raw`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    /// Stable subject identifier (SAML NameID or OIDC `sub`).
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Raw upstream attributes or claims, passed through as received.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub raw: serde_json::Map<String, serde_json::Value>,
}
