//! Connection management.
//!
//! Connections are stored under their minted `client_id` and indexed by
//! `{tenant}:{product}` and, for SAML, by the IdP `entityID`. The protocol
//! is inferred from the create request: SAML metadata selects SAML, a
//! discovery URL selects OIDC, and supplying both or neither is rejected.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use brokkr_store::{Index, Store};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, instrument};
use url::Url;
use validator::Validate;

use crate::error::{SsoError, SsoResult};
use crate::models::{
    Connection, CreateConnectionRequest, IdpConfig, OidcIdp, UpdateConnectionRequest,
};
use crate::saml::parse_idp_metadata;

/// Secondary index on `{tenant}:{product}`.
pub const INDEX_TENANT_PRODUCT: &str = "tenant_product";
/// Secondary index on the minted client identifier.
pub const INDEX_CLIENT_ID: &str = "client_id";
/// Secondary index on the SAML IdP `entityID`.
pub const INDEX_ENTITY_ID: &str = "entity_id";

const CLIENT_ID_LENGTH: usize = 16;
const CLIENT_SECRET_LENGTH: usize = 32;

/// CRUD over stored SSO connections.
#[derive(Clone)]
pub struct ConnectionService {
    store: Store,
}

impl ConnectionService {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn generate_client_id() -> String {
        let mut bytes = [0u8; CLIENT_ID_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn generate_client_secret() -> String {
        let mut bytes = [0u8; CLIENT_SECRET_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn validate_redirect_urls(default_url: &str, urls: &[String]) -> SsoResult<()> {
        for url in std::iter::once(default_url).chain(urls.iter().map(String::as_str)) {
            let parsed = Url::parse(url).map_err(|_| {
                SsoError::InvalidRequest(format!("redirect URL is not a valid URL: {url}"))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(SsoError::InvalidRequest(format!(
                    "redirect URL must use http or https: {url}"
                )));
            }
        }
        Ok(())
    }

    fn indexes_for(connection: &Connection) -> Vec<Index> {
        let mut indexes = vec![
            Index::new(INDEX_TENANT_PRODUCT, connection.tenant_product()),
            Index::new(INDEX_CLIENT_ID, connection.client_id.clone()),
        ];
        if let IdpConfig::Saml(saml) = &connection.idp {
            indexes.push(Index::new(INDEX_ENTITY_ID, saml.entity_id.clone()));
        }
        indexes
    }

    /// Resolve the metadata XML from whichever carrier the request used.
    fn saml_metadata_xml(raw: Option<&str>, encoded: Option<&str>) -> SsoResult<Option<String>> {
        match (raw, encoded) {
            (Some(xml), _) => Ok(Some(xml.to_string())),
            (None, Some(encoded)) => {
                let decoded = STANDARD.decode(encoded).map_err(|e| {
                    SsoError::InvalidRequest(format!(
                        "encoded_raw_metadata is not valid base64: {e}"
                    ))
                })?;
                let xml = String::from_utf8(decoded).map_err(|_| {
                    SsoError::InvalidRequest("decoded metadata is not valid UTF-8".to_string())
                })?;
                Ok(Some(xml))
            }
            (None, None) => Ok(None),
        }
    }

    #[instrument(skip(self, request), fields(tenant = %request.tenant, product = %request.product))]
    pub async fn create(&self, request: CreateConnectionRequest) -> SsoResult<Connection> {
        request
            .validate()
            .map_err(|e| SsoError::InvalidRequest(e.to_string()))?;
        if request.redirect_urls.is_empty() {
            return Err(SsoError::InvalidRequest(
                "at least one redirect URL is required".to_string(),
            ));
        }
        Self::validate_redirect_urls(&request.default_redirect_url, &request.redirect_urls)?;

        let metadata_xml = Self::saml_metadata_xml(
            request.raw_metadata.as_deref(),
            request.encoded_raw_metadata.as_deref(),
        )?;
        let idp = match (metadata_xml, &request.oidc_discovery_url) {
            (Some(_), Some(_)) => {
                return Err(SsoError::InvalidRequest(
                    "a connection is either SAML or OIDC, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(SsoError::InvalidRequest(
                    "provide SAML metadata or an OIDC discovery URL".to_string(),
                ));
            }
            (Some(xml), None) => IdpConfig::Saml(parse_idp_metadata(&xml)?),
            (None, Some(discovery_url)) => {
                let client_id = request
                    .oidc_client_id
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        SsoError::InvalidRequest(
                            "oidc_client_id is required for OIDC connections".to_string(),
                        )
                    })?;
                let client_secret = request
                    .oidc_client_secret
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        SsoError::InvalidRequest(
                            "oidc_client_secret is required for OIDC connections".to_string(),
                        )
                    })?;
                IdpConfig::Oidc(OidcIdp {
                    discovery_url: discovery_url.clone(),
                    client_id,
                    client_secret,
                })
            }
        };

        let connection = Connection {
            client_id: Self::generate_client_id(),
            client_secret: Self::generate_client_secret(),
            tenant: request.tenant,
            product: request.product,
            name: request.name,
            description: request.description,
            default_redirect_url: request.default_redirect_url,
            redirect_urls: request.redirect_urls,
            idp,
        };
        self.store
            .put(
                &connection.client_id,
                &connection,
                &Self::indexes_for(&connection),
            )
            .await?;

        info!(
            client_id = %connection.client_id,
            protocol = connection.idp.protocol(),
            "sso connection created"
        );
        Ok(connection)
    }

    pub async fn get(&self, client_id: &str) -> SsoResult<Option<Connection>> {
        Ok(self.store.get(client_id).await?)
    }

    pub async fn by_tenant_product(&self, tenant: &str, product: &str) -> SsoResult<Vec<Connection>> {
        let index = Index::new(INDEX_TENANT_PRODUCT, format!("{tenant}:{product}"));
        Ok(self.store.get_by_index(&index).await?)
    }

    pub async fn by_entity_id(&self, entity_id: &str) -> SsoResult<Vec<Connection>> {
        let index = Index::new(INDEX_ENTITY_ID, entity_id.to_string());
        Ok(self.store.get_by_index(&index).await?)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        client_id: &str,
        request: UpdateConnectionRequest,
    ) -> SsoResult<Connection> {
        request
            .validate()
            .map_err(|e| SsoError::InvalidRequest(e.to_string()))?;
        let mut connection = self.get(client_id).await?.ok_or_else(|| {
            SsoError::NotFound(format!("no connection with client_id {client_id}"))
        })?;

        if let Some(name) = request.name {
            connection.name = Some(name);
        }
        if let Some(description) = request.description {
            connection.description = Some(description);
        }
        if let Some(default_redirect_url) = request.default_redirect_url {
            connection.default_redirect_url = default_redirect_url;
        }
        if let Some(redirect_urls) = request.redirect_urls {
            if redirect_urls.is_empty() {
                return Err(SsoError::InvalidRequest(
                    "at least one redirect URL is required".to_string(),
                ));
            }
            connection.redirect_urls = redirect_urls;
        }
        Self::validate_redirect_urls(&connection.default_redirect_url, &connection.redirect_urls)?;

        if let Some(xml) = Self::saml_metadata_xml(
            request.raw_metadata.as_deref(),
            request.encoded_raw_metadata.as_deref(),
        )? {
            match &connection.idp {
                IdpConfig::Saml(_) => connection.idp = IdpConfig::Saml(parse_idp_metadata(&xml)?),
                IdpConfig::Oidc(_) => {
                    return Err(SsoError::InvalidRequest(
                        "cannot attach SAML metadata to an OIDC connection".to_string(),
                    ));
                }
            }
        }

        self.store
            .put(
                &connection.client_id,
                &connection,
                &Self::indexes_for(&connection),
            )
            .await?;
        info!(client_id = %connection.client_id, "sso connection updated");
        Ok(connection)
    }

    /// Remove a connection and its index entries. Deleting an unknown
    /// `client_id` is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, client_id: &str) -> SsoResult<()> {
        self.store.delete(client_id).await?;
        info!(client_id, "sso connection deleted");
        Ok(())
    }
}
