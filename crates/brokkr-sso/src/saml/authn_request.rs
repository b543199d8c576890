//! Outbound `AuthnRequest` construction for the Redirect and POST bindings.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use rand::RngCore;
use url::Url;

use crate::error::{SsoError, SsoResult};
use crate::saml::xml_escape;

/// An unsigned `AuthnRequest` document ready for binding encoding.
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    /// Request ID, stored in the login session and matched against the
    /// response's `InResponseTo`.
    pub id: String,
    pub xml: String,
}

/// Build an `AuthnRequest` addressed to `destination`.
///
/// `issuer` is the broker's SP entity ID, `acs_url` the endpoint the IdP
/// should post the response back to. `force_authn` maps `prompt=login`
/// onto `ForceAuthn="true"`.
#[must_use]
pub fn build_authn_request(
    issuer: &str,
    destination: &str,
    acs_url: &str,
    force_authn: bool,
) -> AuthnRequest {
    let mut id_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut id_bytes);
    // xs:ID must not start with a digit.
    let id = format!("_{}", hex::encode(id_bytes));
    let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut xml = String::with_capacity(512);
    xml.push_str("<samlp:AuthnRequest xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\" ");
    xml.push_str("xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" ");
    xml.push_str("ID=\"");
    xml.push_str(&xml_escape(&id));
    xml.push_str("\" Version=\"2.0\" IssueInstant=\"");
    xml.push_str(&issue_instant);
    xml.push_str("\" Destination=\"");
    xml.push_str(&xml_escape(destination));
    xml.push_str("\" ProtocolBinding=\"urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST\" ");
    xml.push_str("AssertionConsumerServiceURL=\"");
    xml.push_str(&xml_escape(acs_url));
    xml.push('"');
    if force_authn {
        xml.push_str(" ForceAuthn=\"true\"");
    }
    xml.push('>');
    xml.push_str("<saml:Issuer>");
    xml.push_str(&xml_escape(issuer));
    xml.push_str("</saml:Issuer>");
    xml.push_str(
        "<samlp:NameIDPolicy Format=\"urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress\" \
         AllowCreate=\"true\"/>",
    );
    xml.push_str("</samlp:AuthnRequest>");

    AuthnRequest { id, xml }
}

/// Encode the request for the HTTP-Redirect binding: raw deflate, base64,
/// then `SAMLRequest` and `RelayState` query parameters appended to the
/// IdP's SSO URL.
pub fn redirect_binding_url(sso_url: &str, request_xml: &str, relay_state: &str) -> SsoResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(request_xml.as_bytes())
        .map_err(|e| SsoError::Internal(format!("deflate encoding failed: {e}")))?;
    let deflated = encoder
        .finish()
        .map_err(|e| SsoError::Internal(format!("deflate encoding failed: {e}")))?;
    let encoded = STANDARD.encode(deflated);

    let mut url = Url::parse(sso_url)
        .map_err(|e| SsoError::Internal(format!("connection SSO URL is not a valid URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("SAMLRequest", &encoded)
        .append_pair("RelayState", relay_state);
    Ok(url.to_string())
}

/// Encode the request for the HTTP-POST binding: a self-submitting HTML
/// form carrying the base64 document.
#[must_use]
pub fn post_binding_form(sso_url: &str, request_xml: &str, relay_state: &str) -> String {
    let encoded = STANDARD.encode(request_xml.as_bytes());
    format!(
        "<!DOCTYPE html>\
         <html><head><title>Redirecting...</title></head>\
         <body onload=\"document.forms[0].submit()\">\
         <noscript><p>Continue to your identity provider:</p></noscript>\
         <form method=\"post\" action=\"{action}\">\
         <input type=\"hidden\" name=\"SAMLRequest\" value=\"{request}\"/>\
         <input type=\"hidden\" name=\"RelayState\" value=\"{relay}\"/>\
         <noscript><button type=\"submit\">Continue</button></noscript>\
         </form></body></html>",
        action = xml_escape(sso_url),
        request = xml_escape(&encoded),
        relay = xml_escape(relay_state),
    )
}
