//! Secure building blocks shared by the PKCE engine, the JWT verifier and
//! the request filter
//!
//! [`SecurePrimitives`] is constructed once at process start and handed to
//! every component that needs it (usually behind an `Arc`).  It holds no
//! mutable state, so concurrent use from many requests needs no locking.
//!
//! # References
//!
//! - RFC 4648 section 5 (base64url) <https://www.rfc-editor.org/rfc/rfc4648#section-5>
//! - FIPS 180-4 (SHA-256)

use std::fmt::Write as _;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq as _;

use crate::error::{OAuthGateError, Result};

/// base64url without padding on encode; decode accepts padded and unpadded
/// input alike.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ---------------------------------------------------------------------------
// SecurePrimitives
// ---------------------------------------------------------------------------

/// Constant-time comparison, secure randomness, base64url and SHA-256.
///
/// # Examples
///
/// ```
/// use oauthgate::secure::SecurePrimitives;
///
/// let primitives = SecurePrimitives::new();
/// assert!(primitives.constant_time_eq(Some("state"), Some("state")));
/// assert!(!primitives.constant_time_eq(Some("state"), None));
///
/// let encoded = primitives.base64url_encode(b"\xfb\xff");
/// assert_eq!(encoded, "-_8");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurePrimitives {
    _private: (),
}

impl SecurePrimitives {
    /// Creates the primitives service.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Compares two optional strings without leaking the position of the
    /// first differing byte.
    ///
    /// Returns `false` when either side is absent or the lengths differ.
    /// Equal-length inputs are compared over every byte regardless of where
    /// they diverge.
    pub fn constant_time_eq(&self, a: Option<&str>, b: Option<&str>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return false;
        };
        if a.len() != b.len() {
            return false;
        }
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }

    /// Returns a uniformly random non-negative integer of `bits` bits,
    /// rendered as lowercase hexadecimal without leading zeros.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::InvalidInput`] when `bits` is negative.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauthgate::secure::SecurePrimitives;
    ///
    /// let primitives = SecurePrimitives::new();
    /// let value = primitives.random_hex(128).unwrap();
    /// assert!(value.len() <= 32);
    /// assert!(value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    /// ```
    pub fn random_hex(&self, bits: i64) -> Result<String> {
        if bits < 0 {
            return Err(OAuthGateError::InvalidInput(format!(
                "bit count must not be negative, got {bits}"
            ))
            .into());
        }
        let bits = usize::try_from(bits)
            .map_err(|_| OAuthGateError::InvalidInput(format!("bit count too large: {bits}")))?;

        let mut buf = vec![0u8; bits.div_ceil(8)];
        rand::rng().fill_bytes(&mut buf);

        // Clear the surplus high bits of the leading byte.
        let excess = buf.len() * 8 - bits;
        if let Some(first) = buf.first_mut() {
            *first &= 0xffu8 >> excess;
        }

        let mut hex = String::with_capacity(buf.len() * 2);
        for byte in &buf {
            let _ = write!(hex, "{byte:02x}");
        }
        let trimmed = hex.trim_start_matches('0');
        if trimmed.is_empty() {
            Ok("0".to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }

    /// Fills `buf` from the cryptographically secure generator.
    pub fn fill_random(&self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }

    /// Returns a uniformly chosen index in `0..upper`.
    pub(crate) fn random_index(&self, upper: usize) -> usize {
        use rand::Rng as _;
        rand::rng().random_range(0..upper)
    }

    /// Encodes bytes as base64url without padding.
    pub fn base64url_encode(&self, bytes: &[u8]) -> String {
        BASE64_URL.encode(bytes)
    }

    /// Decodes base64url input, with or without trailing padding.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::InvalidInput`] when the input contains
    /// characters outside the URL-safe alphabet or has an impossible length.
    pub fn base64url_decode(&self, input: &str) -> Result<Vec<u8>> {
        BASE64_URL
            .decode(input)
            .map_err(|e| OAuthGateError::InvalidInput(format!("invalid base64url: {e}")).into())
    }

    /// SHA-256 digest of `bytes`.
    pub fn sha256(&self, bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
