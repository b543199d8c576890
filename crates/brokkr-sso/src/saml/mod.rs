//! SAML 2.0 plumbing: IdP metadata parsing, `AuthnRequest` construction
//! for the Redirect and POST bindings, and response parsing.
//!
//! Only the subset a service provider needs is implemented. The broker
//! never signs outbound requests; inbound response signatures are checked
//! through the [`SamlSignatureValidator`] seam.

pub mod authn_request;
pub mod metadata;
pub mod response;

pub use authn_request::{build_authn_request, post_binding_form, redirect_binding_url};
pub use metadata::parse_idp_metadata;
pub use response::{
    extract_profile, parse_response, ParsedSamlResponse, SamlSignatureValidator,
    UnconfiguredValidator,
};

/// HTTP-Redirect SingleSignOnService binding URN.
pub const BINDING_HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";

/// HTTP-POST SingleSignOnService binding URN.
pub const BINDING_HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

/// Top-level success status URN.
pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Escape text for inclusion in XML element content or attribute values.
pub(crate) fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}
