//! Webhook signature verification.
//!
//! The sender signs the raw request body with HMAC-SHA1 keyed by the shared
//! secret and sends `x-hub-signature: sha1=<40 hex chars>`. A header of any
//! other shape is rejected before a digest is computed.
//!
//! The digest comparison is an ASCII case-insensitive byte comparison. It is
//! not constant time.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::{Secret, SignatureError};

type HmacSha1 = Hmac<Sha1>;

/// Name of the header carrying the claimed digest.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Algorithm tag that must open the header value.
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Length of a hex-encoded SHA-1 digest.
const HEX_DIGEST_LEN: usize = 40;

// ---------------------------------------------------------------------------

/// The hex digest a request claims for its body, taken from a well-formed
/// `x-hub-signature` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedDigest(String);

impl ClaimedDigest {
    /// Parses a header value of the form `sha1=` followed by 40 characters.
    ///
    /// Only the length and the prefix are checked. A suffix that is not hex
    /// is accepted here and simply never matches.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        if header.len() != SIGNATURE_PREFIX.len() + HEX_DIGEST_LEN {
            return Err(SignatureError::MalformedHeader);
        }
        match header.strip_prefix(SIGNATURE_PREFIX) {
            Some(hex) => Ok(Self(hex.to_string())),
            None => Err(SignatureError::MalformedHeader),
        }
    }

    /// Returns the 40-character digest without the `sha1=` prefix.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------

/// Checks request bodies against claimed digests using the shared secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Secret,
}

impl SignatureVerifier {
    /// Creates a verifier keyed by `secret`.
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// Verifies that `claimed` is the HMAC-SHA1 of `body`.
    pub fn verify(&self, body: &[u8], claimed: &ClaimedDigest) -> Result<(), SignatureError> {
        let computed = self.hex_digest(body)?;
        if computed
            .as_bytes()
            .eq_ignore_ascii_case(claimed.as_hex().as_bytes())
        {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Returns the header value a sender holding the same secret would send
    /// for `body` (`sha1=<lowercase hex>`).
    pub fn sign(&self, body: &[u8]) -> Result<String, SignatureError> {
        Ok(format!("{SIGNATURE_PREFIX}{}", self.hex_digest(body)?))
    }

    fn hex_digest(&self, body: &[u8]) -> Result<String, SignatureError> {
        let mut mac = HmacSha1::new_from_slice(self.secret.expose()).map_err(|e| {
            SignatureError::InvalidKey {
                reason: e.to_string(),
            }
        })?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
