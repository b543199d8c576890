//! Inbound `samlp:Response` parsing and profile extraction.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{SsoError, SsoResult};
use crate::models::Profile;

/// Maximum accepted response document size (512 KB). Rejected before
/// parsing.
const MAX_RESPONSE_SIZE: usize = 512 * 1024;

/// Fields the broker cares about from one `samlp:Response` document.
///
/// Signature verification happens separately on the raw XML through the
/// [`SamlSignatureValidator`] seam; this struct only carries the assertion
/// content.
#[derive(Debug, Clone, Default)]
pub struct ParsedSamlResponse {
    /// Response-level issuer (the assertion issuer is expected to match).
    pub issuer: Option<String>,
    /// Top-level `StatusCode` value URN.
    pub status_code: Option<String>,
    /// `Audience` from the assertion conditions.
    pub audience: Option<String>,
    /// `InResponseTo` on the response element; absent on IdP-initiated
    /// logins.
    pub in_response_to: Option<String>,
    pub name_id: Option<String>,
    pub name_id_format: Option<String>,
    /// Attribute statements flattened to `(name, value)` pairs;
    /// multi-valued attributes repeat the name.
    pub attributes: Vec<(String, String)>,
}

/// Which element's text content the parser is currently inside.
enum TextTarget {
    None,
    Issuer,
    Audience,
    NameId,
    AttributeValue,
}

/// Parse a decoded `samlp:Response` document.
pub fn parse_response(xml: &str) -> SsoResult<ParsedSamlResponse> {
    if xml.len() > MAX_RESPONSE_SIZE {
        return Err(SsoError::InvalidSamlResponse(format!(
            "response exceeds maximum size of {MAX_RESPONSE_SIZE} bytes"
        )));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parsed = ParsedSamlResponse::default();
    let mut target = TextTarget::None;
    let mut current_attribute: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let name = e.local_name();
                let name_str = std::str::from_utf8(name.as_ref()).unwrap_or("");

                match name_str {
                    "Response" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "InResponseTo" {
                                parsed.in_response_to =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "StatusCode" => {
                        // Only the top-level status; nested sub-codes are
                        // detail we do not act on.
                        if parsed.status_code.is_none() {
                            for attr in e.attributes().flatten() {
                                let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                                if key == "Value" {
                                    parsed.status_code = Some(
                                        attr.unescape_value().unwrap_or_default().to_string(),
                                    );
                                }
                            }
                        }
                    }
                    "Issuer" => target = TextTarget::Issuer,
                    "Audience" => target = TextTarget::Audience,
                    "NameID" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "Format" {
                                parsed.name_id_format =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                        target = TextTarget::NameId;
                    }
                    "Attribute" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "Name" {
                                current_attribute =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "AttributeValue" => target = TextTarget::AttributeValue,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match target {
                    TextTarget::Issuer => {
                        if parsed.issuer.is_none() {
                            parsed.issuer = Some(text);
                        }
                    }
                    TextTarget::Audience => {
                        if parsed.audience.is_none() {
                            parsed.audience = Some(text);
                        }
                    }
                    TextTarget::NameId => {
                        if parsed.name_id.is_none() {
                            parsed.name_id = Some(text);
                        }
                    }
                    TextTarget::AttributeValue => {
                        if let Some(name) = &current_attribute {
                            parsed.attributes.push((name.clone(), text));
                        }
                    }
                    TextTarget::None => {}
                }
            }
            Ok(Event::End(e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "Issuer" | "Audience" | "NameID" | "AttributeValue" => {
                        target = TextTarget::None;
                    }
                    "Attribute" => current_attribute = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SsoError::InvalidSamlResponse(format!(
                    "XML parse error: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(parsed)
}

/// Normalized attribute names checked for each profile field, in order.
const EMAIL_ATTRIBUTES: &[&str] = &["email", "mail", "emailAddress"];
const FIRST_NAME_ATTRIBUTES: &[&str] = &["firstName", "givenName", "given_name"];
const LAST_NAME_ATTRIBUTES: &[&str] = &["lastName", "surname", "sn", "family_name"];

fn first_attribute<'a>(parsed: &'a ParsedSamlResponse, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|wanted| {
        parsed
            .attributes
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, value)| value.as_str())
    })
}

/// Build the user profile from a parsed response.
///
/// The subject identifier comes from an `id` attribute or the `NameID`;
/// a response with neither cannot identify anyone and is rejected.
pub fn extract_profile(parsed: &ParsedSamlResponse) -> SsoResult<Profile> {
    let id = first_attribute(parsed, &["id"])
        .map(str::to_string)
        .or_else(|| parsed.name_id.clone())
        .ok_or_else(|| {
            SsoError::InvalidSamlResponse("response contains no subject identifier".to_string())
        })?;

    let email = first_attribute(parsed, EMAIL_ATTRIBUTES)
        .map(str::to_string)
        .or_else(|| parsed.name_id.clone().filter(|n| n.contains('@')));
    let first_name = first_attribute(parsed, FIRST_NAME_ATTRIBUTES).map(str::to_string);
    let last_name = first_attribute(parsed, LAST_NAME_ATTRIBUTES).map(str::to_string);

    let mut raw = serde_json::Map::new();
    for (name, value) in &parsed.attributes {
        match raw.get_mut(name) {
            // Repeated attribute names collect into an array.
            Some(serde_json::Value::Array(values)) => {
                values.push(serde_json::Value::String(value.clone()));
            }
            Some(existing) => {
                let previous = existing.take();
                *existing = serde_json::Value::Array(vec![
                    previous,
                    serde_json::Value::String(value.clone()),
                ]);
            }
            None => {
                raw.insert(name.clone(), serde_json::Value::String(value.clone()));
            }
        }
    }

    Ok(Profile {
        id,
        email,
        first_name,
        last_name,
        raw,
    })
}

/// Checks the XML signature on a response document against a connection's
/// signing certificates.
///
/// Deployments supply the cryptographic implementation; the broker only
/// decides when verification runs.
pub trait SamlSignatureValidator: Send + Sync {
    fn validate(&self, response_xml: &str, certificates: &[String]) -> SsoResult<()>;
}

/// Default validator installed when none is configured. Rejects every
/// response.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredValidator;

impl SamlSignatureValidator for UnconfiguredValidator {
    fn validate(&self, _response_xml: &str, _certificates: &[String]) -> SsoResult<()> {
        Err(SsoError::InvalidSamlResponse(
            "signature verification is not configured".to_string(),
        ))
    }
}
