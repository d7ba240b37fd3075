//! RS256 compact JWT signature verification
//!
//! A token is checked in this order:
//!
//! 1. It must split on `.` into exactly three segments.
//! 2. The header segment must decode to a JSON object with a string `kid`
//!    (and, when present, `alg` must be `RS256`).
//! 3. `kid` must resolve in the supplied key set.
//! 4. The RSA public key is rebuilt from the key's `n` and `e`.
//! 5. The RSASSA-PKCS1-v1_5 SHA-256 signature over the ASCII bytes of
//!    `header.payload` must verify.
//!
//! Structural problems and signature mismatches are ordinary outcomes
//! ([`Verification`]); only a key the signature primitive cannot use at all
//! is an error.  Claims are not looked at here, see
//! [`claims`](super::claims).

use ring::signature::{RsaPublicKeyComponents, RSA_PKCS1_2048_8192_SHA256};
use serde::de::DeserializeOwned;

use crate::cognito::jwks::{Jwk, JwkSet};
use crate::error::{OAuthGateError, Result};
use crate::secure::SecurePrimitives;

/// Smallest and largest modulus the verifier accepts, in bits.
const MIN_MODULUS_BITS: usize = 2048;
const MAX_MODULUS_BITS: usize = 8192;

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Result of checking one token against a key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The signature verified with the key named by `kid`.
    Valid,

    /// The token is not a well-formed RS256 compact JWT.
    Malformed(String),

    /// The header names a key the set does not contain.
    UnknownKey(String),

    /// The signature does not verify with the resolved key.
    BadSignature,
}

impl Verification {
    /// Returns `true` only for [`Verification::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

#[derive(Debug, serde::Deserialize)]
struct JoseHeader {
    kid: Option<String>,
    alg: Option<String>,
}

// ---------------------------------------------------------------------------
// JwtVerifier
// ---------------------------------------------------------------------------

/// Stateless RS256 verifier.
///
/// # Examples
///
/// ```
/// use oauthgate::cognito::jwks::JwkSet;
/// use oauthgate::cognito::jwt::{JwtVerifier, Verification};
/// use oauthgate::secure::SecurePrimitives;
///
/// let verifier = JwtVerifier::new(SecurePrimitives::new());
/// let outcome = verifier.inspect("only.two", &JwkSet::default()).unwrap();
/// assert!(matches!(outcome, Verification::Malformed(_)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JwtVerifier {
    primitives: SecurePrimitives,
}

impl JwtVerifier {
    /// Creates a verifier using the shared primitives.
    pub fn new(primitives: SecurePrimitives) -> Self {
        Self { primitives }
    }

    /// Returns `true` iff `token` carries a valid signature from a key in
    /// `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::Crypto`] when the resolved key cannot be
    /// used by the signature primitive.
    pub fn verify(&self, token: &str, keys: &JwkSet) -> Result<bool> {
        Ok(self.inspect(token, keys)?.is_valid())
    }

    /// Checks `token` and reports why it was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::Crypto`] when the resolved key cannot be
    /// used by the signature primitive.
    pub fn inspect(&self, token: &str, keys: &JwkSet) -> Result<Verification> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments.as_slice() else {
            tracing::warn!(segments = segments.len(), "Token does not appear to be a JWT");
            return Ok(Verification::Malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let header_json = match self.primitives.base64url_decode(header) {
            Ok(bytes) => bytes,
            Err(e) => return Ok(malformed(format!("header: {e}"))),
        };
        let jose: JoseHeader = match serde_json::from_slice(&header_json) {
            Ok(h) => h,
            Err(e) => return Ok(malformed(format!("header is not a JSON object: {e}"))),
        };

        if let Some(alg) = jose.alg.as_deref() {
            if alg != "RS256" {
                return Ok(malformed(format!("unsupported algorithm {alg}")));
            }
        }

        let Some(kid) = jose.kid else {
            return Ok(malformed("header has no kid".to_string()));
        };

        let Some(jwk) = keys.resolve(&kid) else {
            tracing::warn!(kid = %kid, "Missing public key in key set");
            return Ok(Verification::UnknownKey(kid));
        };

        let signature = match self.primitives.base64url_decode(signature) {
            Ok(bytes) => bytes,
            Err(e) => return Ok(malformed(format!("signature: {e}"))),
        };

        let public_key = self.public_key(jwk)?;
        let signing_input = format!("{header}.{payload}");

        match public_key.verify(
            &RSA_PKCS1_2048_8192_SHA256,
            signing_input.as_bytes(),
            &signature,
        ) {
            Ok(()) => Ok(Verification::Valid),
            Err(_) => {
                tracing::warn!(kid = %kid, "Signature mismatch, JWT invalid");
                Ok(Verification::BadSignature)
            }
        }
    }

    /// Decodes the payload segment of `token` without verifying it.
    ///
    /// Only call this on tokens that [`inspect`](Self::inspect) accepted.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::InvalidInput`] when the payload is not
    /// base64url JSON of the requested shape.
    pub fn payload<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| OAuthGateError::InvalidInput("token has no payload".to_string()))?;
        let bytes = self.primitives.base64url_decode(payload)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            OAuthGateError::InvalidInput(format!("token payload is not valid JSON: {e}")).into()
        })
    }

    /// Rebuilds the RSA public key from the JWK's modulus and exponent.
    fn public_key(&self, jwk: &Jwk) -> Result<RsaPublicKeyComponents<Vec<u8>>> {
        if jwk.kty != "RSA" {
            return Err(OAuthGateError::Crypto(format!(
                "key {} has type {}, expected RSA",
                jwk.kid, jwk.kty
            ))
            .into());
        }

        let n = strip_leading_zeros(self.primitives.base64url_decode(&jwk.n).map_err(|e| {
            OAuthGateError::Crypto(format!("key {} has an undecodable modulus: {e}", jwk.kid))
        })?);
        let e = strip_leading_zeros(self.primitives.base64url_decode(&jwk.e).map_err(|e| {
            OAuthGateError::Crypto(format!("key {} has an undecodable exponent: {e}", jwk.kid))
        })?);

        let bits = n
            .first()
            .map_or(0, |b| n.len() * 8 - b.leading_zeros() as usize);
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) || e.is_empty() {
            return Err(OAuthGateError::Crypto(format!(
                "key {} has an unusable size of {bits} bits",
                jwk.kid
            ))
            .into());
        }

        Ok(RsaPublicKeyComponents { n, e })
    }
}

fn malformed(reason: String) -> Verification {
    tracing::warn!(reason = %reason, "Malformed JWT");
    Verification::Malformed(reason)
}

fn strip_leading_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    let zeros = bytes.iter().take_while(|b| **b == 0).count();
    bytes.drain(..zeros);
    bytes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
