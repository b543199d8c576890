//! Business logic behind the broker endpoints.

pub mod authorize;
pub mod connections;
pub mod oidc_callback;
pub mod saml_acs;
pub mod token;

pub use authorize::{AuthorizeAction, AuthorizeService, ResolvedAuthorize};
pub use connections::ConnectionService;
pub use oidc_callback::OidcCallbackService;
pub use saml_acs::SamlAcsService;
pub use token::TokenService;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Byte length of minted codes and access tokens.
const OPAQUE_TOKEN_LENGTH: usize = 32;

/// Generate an unguessable URL-safe value for authorization codes and
/// access tokens.
pub(crate) fn generate_opaque_token() -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
