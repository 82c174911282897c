//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for public clients that cannot hold a client secret.
//! All randomness comes from the operating system CSPRNG.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Challenge method sent with every authorization request
pub const CODE_CHALLENGE_METHOD: &str = "S256";

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 32;

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(&bytes);
    bytes.zeroize();
    encoded
}

/// Generate a cryptographically secure code verifier
///
/// Returns 32 random bytes, base64url encoded without padding
/// (43 characters, within the RFC 7636 43-128 limit).
#[must_use]
pub fn generate_code_verifier() -> String {
    random_urlsafe(VERIFIER_BYTES)
}

/// Generate code challenge from verifier using SHA256
///
/// Per RFC 7636, the challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state token for CSRF protection
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(STATE_BYTES)
}

/// Validate that the state token matches, in constant time
///
/// # Arguments
/// * `expected` - The state that was sent in the authorization request
/// * `actual` - The state received in the callback
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    let (expected, actual) = (expected.as_bytes(), actual.as_bytes());
    if expected.len() != actual.len() {
        return false;
    }
    expected.iter().zip(actual).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// Per-attempt PKCE material
///
/// Lives only in memory for the duration of one login attempt and is wiped
/// on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PkceContext {
    /// Random secret, revealed only to the token endpoint
    pub code_verifier: String,

    /// `SHA256(code_verifier)`, sent in the authorization request
    pub code_challenge: String,

    /// CSRF token echoed back in the callback
    pub state: String,
}

impl PkceContext {
    /// Generate fresh verifier, challenge and state
    ///
    /// # Examples
    /// ```
    /// use receptionist_common::auth::pkce::PkceContext;
    ///
    /// let pkce = PkceContext::generate();
    /// assert_eq!(pkce.code_verifier.len(), 43);
    /// assert_ne!(pkce.code_verifier, pkce.state);
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        Self { code_verifier, code_challenge, state }
    }

    /// Get the challenge method (always "S256")
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        CODE_CHALLENGE_METHOD
    }
}

impl fmt::Debug for PkceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceContext")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::pkce.
    use std::collections::HashSet;

    use super::*;

    /// Validates `generate_code_verifier` length and alphabet.
    ///
    /// Assertions:
    /// - Ensures the verifier is 43 characters.
    /// - Ensures only unreserved base64url characters appear.
    #[test]
    fn test_verifier_format() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 43);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    /// Validates `generate_code_challenge` against the RFC 7636 appendix B
    /// test vector.
    #[test]
    fn test_challenge_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    /// Validates that repeated generation does not repeat values.
    #[test]
    fn test_generation_is_unique() {
        let states: HashSet<_> = (0..64).map(|_| generate_state()).collect();
        assert_eq!(states.len(), 64);

        let first = PkceContext::generate();
        let second = PkceContext::generate();
        assert_ne!(first.code_verifier, second.code_verifier);
        assert_ne!(first.state, second.state);
    }

    /// Validates `validate_state` behavior.
    ///
    /// Assertions:
    /// - Confirms identical strings match.
    /// - Ensures differing content or length does not match.
    #[test]
    fn test_validate_state() {
        let state = generate_state();
        assert!(validate_state(&state, &state.clone()));
        assert!(!validate_state(&state, &generate_state()));
        assert!(!validate_state(&state, &state[..10]));
        assert!(!validate_state("", "x"));
    }

    /// Validates `PkceContext::generate` consistency.
    #[test]
    fn test_context_challenge_matches_verifier() {
        let pkce = PkceContext::generate();
        assert_eq!(pkce.code_challenge, generate_code_challenge(&pkce.code_verifier));
        assert_eq!(pkce.challenge_method(), "S256");
        assert!(!format!("{pkce:?}").contains(&pkce.code_verifier));
    }
}
