//! PKCE (RFC 7636) helpers. Only the S256 transform is supported; `plain`
//! is rejected at the authorize endpoint.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Byte length of generated verifiers (encodes to 43 characters).
const VERIFIER_LENGTH: usize = 32;

/// Generate a fresh code verifier for an upstream authorization.
#[must_use]
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the S256 challenge for a verifier.
#[must_use]
pub fn code_challenge_s256(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Check a verifier against a stored challenge in constant time.
#[must_use]
pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    let computed = code_challenge_s256(verifier);
    subtle::ConstantTimeEq::ct_eq(computed.as_bytes(), challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_7636_appendix_b_vector() {
        assert_eq!(
            code_challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_verifier_round_trips() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 43);

        let challenge = code_challenge_s256(&verifier);
        assert!(verify_s256(&verifier, &challenge));
        assert!(!verify_s256("wrong-verifier", &challenge));
    }

    #[test]
    fn test_verifiers_are_unique() {
        assert_ne!(generate_verifier(), generate_verifier());
    }
}
