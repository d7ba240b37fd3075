//! PKCE S256 code verifier and challenge generation
//!
//! This module implements the client side of Proof Key for Code Exchange
//! (RFC 7636) with the `S256` challenge method.
//!
//! # How PKCE works here
//!
//! 1. [`code_verifier`] draws 128 characters from the 66-symbol unreserved
//!    alphabet `[A-Z] [a-z] [0-9] - . _ ~`.
//! 2. [`code_challenge`] hashes the verifier's ASCII bytes with SHA-256 and
//!    base64url-encodes the digest without padding.
//! 3. The challenge goes into the authorization URL; the verifier stays in the
//!    caller's session until the callback arrives and is then sent to the
//!    token endpoint.  The provider checks the pair, never this crate.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use crate::secure::SecurePrimitives;

/// Length of every generated code verifier.
pub const CODE_VERIFIER_LENGTH: usize = 128;

/// The unreserved characters a verifier may contain (RFC 7636 section 4.1).
pub const CODE_VERIFIER_SYMBOLS: &[u8; 66] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// The only challenge method this crate sends.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkcePair
// ---------------------------------------------------------------------------

/// A verifier together with its derived `S256` challenge.
///
/// # Examples
///
/// ```
/// use oauthgate::pkce::{code_challenge, PkcePair};
/// use oauthgate::secure::SecurePrimitives;
///
/// let primitives = SecurePrimitives::new();
/// let pair = PkcePair::generate(&primitives);
///
/// assert_eq!(pair.verifier.len(), 128);
/// assert_eq!(pair.challenge, code_challenge(&primitives, &pair.verifier));
/// ```
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// The secret kept in the pending-authorization state.
    pub verifier: String,

    /// `BASE64URL(SHA256(ASCII(verifier)))`, sent to the authorization
    /// endpoint.
    pub challenge: String,
}

impl PkcePair {
    /// Generates a fresh verifier and derives its challenge.
    pub fn generate(primitives: &SecurePrimitives) -> Self {
        let verifier = code_verifier(primitives);
        let challenge = code_challenge(primitives, &verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Returns a 128-character verifier, each character drawn uniformly from
/// [`CODE_VERIFIER_SYMBOLS`] with the secure generator.
pub fn code_verifier(primitives: &SecurePrimitives) -> String {
    (0..CODE_VERIFIER_LENGTH)
        .map(|_| {
            let index = primitives.random_index(CODE_VERIFIER_SYMBOLS.len());
            char::from(CODE_VERIFIER_SYMBOLS[index])
        })
        .collect()
}

/// Derives the `S256` code challenge for `verifier`.
///
/// # Examples
///
/// ```
/// use oauthgate::pkce::code_challenge;
/// use oauthgate::secure::SecurePrimitives;
///
/// // RFC 7636 Appendix B.
/// let challenge = code_challenge(
///     &SecurePrimitives::new(),
///     "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
/// );
/// assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
/// ```
pub fn code_challenge(primitives: &SecurePrimitives, verifier: &str) -> String {
    let digest = primitives.sha256(verifier.as_bytes());
    primitives.base64url_encode(&digest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
