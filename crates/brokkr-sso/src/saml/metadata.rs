//! IdP metadata parsing.
//!
//! Extracts the `entityID`, the HTTP-Redirect and HTTP-POST
//! `SingleSignOnService` locations and the signing certificates from an
//! `EntityDescriptor` document. Everything else in the metadata is ignored.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{SsoError, SsoResult};
use crate::models::SamlIdp;
use crate::saml::{BINDING_HTTP_POST, BINDING_HTTP_REDIRECT};

/// Maximum accepted metadata size (1 MB). Rejected before parsing.
const MAX_METADATA_SIZE: usize = 1024 * 1024;

/// Parse an IdP metadata document into the connection's SAML configuration.
///
/// Certificates under a `KeyDescriptor use="encryption"` are skipped; a
/// missing `use` attribute counts as signing. Whitespace inside certificate
/// text is stripped so the stored value is plain base64.
pub fn parse_idp_metadata(xml: &str) -> SsoResult<SamlIdp> {
    if xml.len() > MAX_METADATA_SIZE {
        return Err(SsoError::InvalidRequest(format!(
            "metadata exceeds maximum size of {MAX_METADATA_SIZE} bytes"
        )));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entity_id = None;
    let mut sso_redirect_url = None;
    let mut sso_post_url = None;
    let mut certificates = Vec::new();
    let mut in_certificate = false;
    let mut in_encryption_key = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let name = e.local_name();
                let name_str = std::str::from_utf8(name.as_ref()).unwrap_or("");

                match name_str {
                    "EntityDescriptor" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "entityID" {
                                entity_id =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "KeyDescriptor" => {
                        in_encryption_key = false;
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "use" {
                                let value = attr.unescape_value().unwrap_or_default();
                                in_encryption_key = value == "encryption";
                            }
                        }
                    }
                    "SingleSignOnService" => {
                        let mut binding = None;
                        let mut location = None;
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            let value = attr.unescape_value().unwrap_or_default();
                            match key {
                                "Binding" => binding = Some(value.to_string()),
                                "Location" => location = Some(value.to_string()),
                                _ => {}
                            }
                        }
                        if let (Some(binding), Some(location)) = (binding, location) {
                            match binding.as_str() {
                                BINDING_HTTP_REDIRECT if sso_redirect_url.is_none() => {
                                    sso_redirect_url = Some(location);
                                }
                                BINDING_HTTP_POST if sso_post_url.is_none() => {
                                    sso_post_url = Some(location);
                                }
                                _ => {}
                            }
                        }
                    }
                    "X509Certificate" => {
                        in_certificate = !in_encryption_key;
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if in_certificate {
                    let text = e.unescape().unwrap_or_default();
                    let cert: String = text.split_whitespace().collect();
                    if !cert.is_empty() {
                        certificates.push(cert);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "X509Certificate" => in_certificate = false,
                    "KeyDescriptor" => in_encryption_key = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SsoError::InvalidRequest(format!(
                    "metadata XML parse error: {e}"
                )));
            }
            _ => {}
        }
    }

    let entity_id = entity_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SsoError::InvalidRequest("metadata is missing entityID".to_string()))?;

    if sso_redirect_url.is_none() && sso_post_url.is_none() {
        return Err(SsoError::InvalidRequest(
            "metadata advertises no HTTP-Redirect or HTTP-POST SingleSignOnService".to_string(),
        ));
    }

    if certificates.is_empty() {
        return Err(SsoError::InvalidRequest(
            "metadata contains no signing certificate".to_string(),
        ));
    }

    Ok(SamlIdp {
        entity_id,
        sso_redirect_url,
        sso_post_url,
        certificates,
    })
}
