//! Assertion consumer service: turns validated SAML responses into
//! single-use authorization codes.
//!
//! A `RelayState` carrying a broker session ID marks an SP-initiated
//! login; anything else is treated as IdP-initiated and resolved through
//! the response issuer, gated by the `idp_initiated_enabled` option.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use brokkr_store::Store;
use tracing::{info, instrument};
use url::Url;

use crate::error::{SsoError, SsoResult};
use crate::models::{
    AuthCodePayload, CodeSession, IdpConfig, LoginSession, SamlAcsForm, SESSION_ID_PREFIX,
};
use crate::router::SsoOptions;
use crate::saml::{extract_profile, parse_response, SamlSignatureValidator, STATUS_SUCCESS};
use crate::services::{generate_opaque_token, ConnectionService};

/// Maximum accepted size of the base64 form field (512 KB). Rejected
/// before decoding.
const MAX_ENCODED_RESPONSE_SIZE: usize = 512 * 1024;

/// Consumes IdP responses posted to the ACS endpoint.
#[derive(Clone)]
pub struct SamlAcsService {
    connections: ConnectionService,
    sessions: Store,
    codes: Store,
    validator: Arc<dyn SamlSignatureValidator>,
    options: SsoOptions,
}

impl SamlAcsService {
    #[must_use]
    pub fn new(
        connections: ConnectionService,
        sessions: Store,
        codes: Store,
        validator: Arc<dyn SamlSignatureValidator>,
        options: SsoOptions,
    ) -> Self {
        Self {
            connections,
            sessions,
            codes,
            validator,
            options,
        }
    }

    /// Pop the login session referenced by the `RelayState`.
    ///
    /// `Ok(None)` means the value does not reference a broker session and
    /// the response is a candidate IdP-initiated login. A `RelayState`
    /// that looks like ours but resolves to nothing is an expired or
    /// replayed session, which is an error. The session is consumed either
    /// way; a response can only be processed against it once.
    pub async fn take_session(
        &self,
        relay_state: Option<&str>,
    ) -> SsoResult<Option<LoginSession>> {
        let Some(relay_state) = relay_state.filter(|r| r.starts_with(SESSION_ID_PREFIX)) else {
            return Ok(None);
        };
        match self.sessions.take::<LoginSession>(relay_state).await? {
            Some(session) => Ok(Some(session)),
            None => Err(SsoError::InvalidRequest(
                "login session not found or expired".to_string(),
            )),
        }
    }

    /// Validate the posted response and mint an authorization code,
    /// returning the SP redirect URL carrying it.
    #[instrument(skip(self, form, session), fields(idp_initiated = session.is_none()))]
    pub async fn process(
        &self,
        form: &SamlAcsForm,
        session: Option<&LoginSession>,
    ) -> SsoResult<String> {
        if form.saml_response.len() > MAX_ENCODED_RESPONSE_SIZE {
            return Err(SsoError::InvalidSamlResponse(format!(
                "encoded response exceeds maximum size of {MAX_ENCODED_RESPONSE_SIZE} bytes"
            )));
        }
        let decoded = STANDARD
            .decode(form.saml_response.as_bytes())
            .map_err(|e| SsoError::InvalidSamlResponse(format!("base64 decode failed: {e}")))?;
        let xml = String::from_utf8(decoded).map_err(|_| {
            SsoError::InvalidSamlResponse("response is not valid UTF-8".to_string())
        })?;
        let parsed = parse_response(&xml)?;

        let connection = match session {
            Some(session) => self
                .connections
                .get(&session.connection_client_id)
                .await?
                .ok_or_else(|| {
                    SsoError::InvalidRequest("connection no longer exists".to_string())
                })?,
            None => {
                if !self.options.idp_initiated_enabled {
                    return Err(SsoError::InvalidRequest(
                        "IdP-initiated logins are disabled".to_string(),
                    ));
                }
                let issuer = parsed.issuer.as_deref().ok_or_else(|| {
                    SsoError::InvalidSamlResponse("response carries no issuer".to_string())
                })?;
                let mut matches = self.connections.by_entity_id(issuer).await?;
                if matches.len() != 1 {
                    return Err(SsoError::InvalidRequest(
                        "cannot resolve a unique connection for this issuer".to_string(),
                    ));
                }
                matches.remove(0)
            }
        };

        let IdpConfig::Saml(saml) = &connection.idp else {
            return Err(SsoError::InvalidRequest(
                "the resolved connection is not a SAML connection".to_string(),
            ));
        };

        self.validator.validate(&xml, &saml.certificates)?;

        match parsed.status_code.as_deref() {
            Some(STATUS_SUCCESS) => {}
            Some(other) => {
                return Err(SsoError::InvalidSamlResponse(format!(
                    "IdP returned status {other}"
                )));
            }
            None => {
                return Err(SsoError::InvalidSamlResponse(
                    "response carries no status".to_string(),
                ));
            }
        }

        match parsed.issuer.as_deref() {
            Some(issuer) if issuer == saml.entity_id => {}
            Some(_) => {
                return Err(SsoError::InvalidSamlResponse(
                    "issuer does not match the connection".to_string(),
                ));
            }
            None => {
                return Err(SsoError::InvalidSamlResponse(
                    "response carries no issuer".to_string(),
                ));
            }
        }

        if let Some(audience) = parsed.audience.as_deref() {
            if audience != self.options.saml_audience {
                return Err(SsoError::InvalidSamlResponse(
                    "audience restriction does not match".to_string(),
                ));
            }
        }

        match (session, parsed.in_response_to.as_deref()) {
            // An unsolicited response claiming to answer a request is a
            // replay across flows.
            (None, Some(_)) => {
                return Err(SsoError::InvalidSamlResponse(
                    "unsolicited response must not carry InResponseTo".to_string(),
                ));
            }
            (Some(session), Some(in_response_to)) => {
                if session.saml_request_id.as_deref() != Some(in_response_to) {
                    return Err(SsoError::InvalidSamlResponse(
                        "InResponseTo does not match the login session".to_string(),
                    ));
                }
            }
            _ => {}
        }

        let profile = extract_profile(&parsed)?;
        let code = generate_opaque_token();
        let payload = AuthCodePayload {
            connection_client_id: connection.client_id.clone(),
            tenant: connection.tenant.clone(),
            product: connection.product.clone(),
            profile,
            session: session.map(CodeSession::from),
        };
        self.codes.put(&code, &payload, &[]).await?;

        let redirect_to = match session {
            Some(session) => {
                let mut url = Url::parse(&session.redirect_uri).map_err(|e| {
                    SsoError::Internal(format!("stored redirect_uri failed to parse: {e}"))
                })?;
                url.query_pairs_mut()
                    .append_pair("code", &code)
                    .append_pair("state", &session.state);
                url.to_string()
            }
            None => {
                let mut url = Url::parse(&connection.default_redirect_url).map_err(|e| {
                    SsoError::Internal(format!("stored redirect URL failed to parse: {e}"))
                })?;
                url.query_pairs_mut().append_pair("code", &code);
                url.to_string()
            }
        };

        info!(connection = %connection.client_id, "authorization code issued");
        Ok(redirect_to)
    }
}

#[cfg(test)]
mod tests {
    use brokkr_store::Database;

    use crate::models::CreateConnectionRequest;
    use crate::saml::UnconfiguredValidator;

    use super::*;

    const ENTITY_ID: &str = "https://idp.example.com/saml";

    struct AcceptAll;
    impl SamlSignatureValidator for AcceptAll {
        fn validate(&self, _response_xml: &str, _certificates: &[String]) -> SsoResult<()> {
            Ok(())
        }
    }

    fn metadata() -> String {
        format!(
            r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{ENTITY_ID}">
  <IDPSSODescriptor>
    <KeyDescriptor use="signing"><KeyInfo><X509Data><X509Certificate>MIICsample</X509Certificate></X509Data></KeyInfo></KeyDescriptor>
    <SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/sso"/>
  </IDPSSODescriptor>
</EntityDescriptor>"#
        )
    }

    fn response_xml(issuer: &str, audience: &str, in_response_to: Option<&str>) -> String {
        let in_response_to = in_response_to
            .map(|id| format!(" InResponseTo=\"{id}\""))
            .unwrap_or_default();
        format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1"{in_response_to} Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
  <saml:Issuer>{issuer}</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_a1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
    <saml:Issuer>{issuer}</saml:Issuer>
    <saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">jdoe@example.com</saml:NameID></saml:Subject>
    <saml:Conditions><saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction></saml:Conditions>
    <saml:AttributeStatement>
      <saml:Attribute Name="firstName"><saml:AttributeValue>Jack</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#
        )
    }

    fn form(xml: &str, relay_state: Option<&str>) -> SamlAcsForm {
        SamlAcsForm {
            saml_response: STANDARD.encode(xml),
            relay_state: relay_state.map(str::to_string),
        }
    }

    struct Harness {
        db: Database,
        connections: ConnectionService,
        service: SamlAcsService,
    }

    fn harness_with(options: SsoOptions) -> Harness {
        let db = Database::in_memory();
        let connections = ConnectionService::new(db.store("sso:connection", 0));
        let service = SamlAcsService::new(
            connections.clone(),
            db.store("sso:session", 300),
            db.store("oauth:code", 300),
            Arc::new(AcceptAll),
            options,
        );
        Harness {
            db,
            connections,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(SsoOptions::default())
    }

    async fn create_connection(harness: &Harness) -> crate::models::Connection {
        harness
            .connections
            .create(CreateConnectionRequest {
                tenant: "acme.com".to_string(),
                product: "crm".to_string(),
                default_redirect_url: "https://sp.example.com/default".to_string(),
                redirect_urls: vec!["https://sp.example.com/done".to_string()],
                raw_metadata: Some(metadata()),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn seed_session(harness: &Harness, connection_client_id: &str) -> LoginSession {
        let session = LoginSession {
            id: format!("{SESSION_ID_PREFIX}seeded1"),
            connection_client_id: connection_client_id.to_string(),
            tenant: "acme.com".to_string(),
            product: "crm".to_string(),
            redirect_uri: "https://sp.example.com/done".to_string(),
            state: "sp-state-1".to_string(),
            scope: None,
            code_challenge: None,
            code_challenge_method: None,
            force_authn: false,
            saml_request_id: Some("_req1".to_string()),
            oidc_nonce: None,
            oidc_code_verifier: None,
        };
        harness
            .db
            .store("sso:session", 300)
            .put(&session.id, &session, &[])
            .await
            .unwrap();
        session
    }

    fn audience() -> String {
        SsoOptions::default().saml_audience
    }

    #[tokio::test]
    async fn test_sp_initiated_login_mints_code() {
        let harness = harness();
        let connection = create_connection(&harness).await;
        let session = seed_session(&harness, &connection.client_id).await;

        let taken = harness
            .service
            .take_session(Some(&session.id))
            .await
            .unwrap()
            .unwrap();
        let xml = response_xml(ENTITY_ID, &audience(), Some("_req1"));
        let redirect = harness
            .service
            .process(&form(&xml, Some(&session.id)), Some(&taken))
            .await
            .unwrap();

        let url = Url::parse(&redirect).unwrap();
        assert!(redirect.starts_with("https://sp.example.com/done"));
        let pairs: std::collections::HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(pairs["state"], "sp-state-1");

        let payload: AuthCodePayload = harness
            .db
            .store("oauth:code", 300)
            .get(&pairs["code"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.connection_client_id, connection.client_id);
        assert_eq!(payload.profile.email.as_deref(), Some("jdoe@example.com"));
        let snapshot = payload.session.unwrap();
        assert_eq!(snapshot.redirect_uri, "https://sp.example.com/done");
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let harness = harness();
        let connection = create_connection(&harness).await;
        let session = seed_session(&harness, &connection.client_id).await;

        harness
            .service
            .take_session(Some(&session.id))
            .await
            .unwrap()
            .unwrap();
        let err = harness
            .service
            .take_session(Some(&session.id))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("session"));
    }

    #[tokio::test]
    async fn test_foreign_relay_state_means_idp_initiated() {
        let harness = harness();

        assert!(harness.service.take_session(None).await.unwrap().is_none());
        assert!(harness
            .service
            .take_session(Some("some-upstream-value"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_issuer_mismatch_is_rejected() {
        let harness = harness();
        let connection = create_connection(&harness).await;
        let session = seed_session(&harness, &connection.client_id).await;

        let xml = response_xml("https://evil.example.com", &audience(), Some("_req1"));
        let err = harness
            .service
            .process(&form(&xml, Some(&session.id)), Some(&session))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("issuer"));
    }

    #[tokio::test]
    async fn test_failed_status_is_rejected() {
        let harness = harness();
        let connection = create_connection(&harness).await;
        let session = seed_session(&harness, &connection.client_id).await;

        let xml = response_xml(ENTITY_ID, &audience(), Some("_req1"))
            .replace("status:Success", "status:Responder");
        let err = harness
            .service
            .process(&form(&xml, Some(&session.id)), Some(&session))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status"));
    }

    #[tokio::test]
    async fn test_audience_mismatch_is_rejected() {
        let harness = harness();
        let connection = create_connection(&harness).await;
        let session = seed_session(&harness, &connection.client_id).await;

        let xml = response_xml(ENTITY_ID, "https://other.example.com", Some("_req1"));
        let err = harness
            .service
            .process(&form(&xml, Some(&session.id)), Some(&session))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("audience"));
    }

    #[tokio::test]
    async fn test_in_response_to_mismatch_is_rejected() {
        let harness = harness();
        let connection = create_connection(&harness).await;
        let session = seed_session(&harness, &connection.client_id).await;

        let xml = response_xml(ENTITY_ID, &audience(), Some("_other_request"));
        let err = harness
            .service
            .process(&form(&xml, Some(&session.id)), Some(&session))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InResponseTo"));
    }

    #[tokio::test]
    async fn test_default_validator_fails_closed() {
        let db = Database::in_memory();
        let connections = ConnectionService::new(db.store("sso:connection", 0));
        let service = SamlAcsService::new(
            connections.clone(),
            db.store("sso:session", 300),
            db.store("oauth:code", 300),
            Arc::new(UnconfiguredValidator),
            SsoOptions::default(),
        );
        let connection = connections
            .create(CreateConnectionRequest {
                tenant: "acme.com".to_string(),
                product: "crm".to_string(),
                default_redirect_url: "https://sp.example.com/default".to_string(),
                redirect_urls: vec!["https://sp.example.com/done".to_string()],
                raw_metadata: Some(metadata()),
                ..Default::default()
            })
            .await
            .unwrap();
        let session = LoginSession {
            id: format!("{SESSION_ID_PREFIX}seeded1"),
            connection_client_id: connection.client_id,
            tenant: "acme.com".to_string(),
            product: "crm".to_string(),
            redirect_uri: "https://sp.example.com/done".to_string(),
            state: "sp-state-1".to_string(),
            scope: None,
            code_challenge: None,
            code_challenge_method: None,
            force_authn: false,
            saml_request_id: Some("_req1".to_string()),
            oidc_nonce: None,
            oidc_code_verifier: None,
        };

        let xml = response_xml(ENTITY_ID, &audience(), Some("_req1"));
        let err = service
            .process(&form(&xml, Some(&session.id)), Some(&session))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_idp_initiated_disabled_by_default() {
        let harness = harness();
        create_connection(&harness).await;

        let xml = response_xml(ENTITY_ID, &audience(), None);
        let err = harness
            .service
            .process(&form(&xml, None), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[tokio::test]
    async fn test_idp_initiated_login_uses_default_redirect() {
        let harness = harness_with(SsoOptions {
            idp_initiated_enabled: true,
            ..SsoOptions::default()
        });
        let connection = create_connection(&harness).await;

        let xml = response_xml(ENTITY_ID, &audience(), None);
        let redirect = harness
            .service
            .process(&form(&xml, None), None)
            .await
            .unwrap();

        assert!(redirect.starts_with("https://sp.example.com/default"));
        let url = Url::parse(&redirect).unwrap();
        let code = url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.to_string())
            .unwrap();
        assert!(!url.query_pairs().any(|(k, _)| k == "state"));

        let payload: AuthCodePayload = harness
            .db
            .store("oauth:code", 300)
            .get(&code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.connection_client_id, connection.client_id);
        assert!(payload.session.is_none());
    }

    #[tokio::test]
    async fn test_unsolicited_response_with_in_response_to_is_rejected() {
        let harness = harness_with(SsoOptions {
            idp_initiated_enabled: true,
            ..SsoOptions::default()
        });
        create_connection(&harness).await;

        let xml = response_xml(ENTITY_ID, &audience(), Some("_req1"));
        let err = harness
            .service
            .process(&form(&xml, None), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InResponseTo"));
    }
}
