//! The signing capability shared by asymmetric and symmetric keys.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{ApiSecurityError, ApiSecurityResult, SignatureErrorKind};

/// Key material able to sign data and verify signatures.
///
/// Signatures cross the wire as standard base64 text.
pub trait KeyMaterial {
    /// Sign `data`, returning the base64-encoded signature.
    fn sign(&self, data: &[u8]) -> ApiSecurityResult<String>;

    /// Verify a base64-encoded signature over `data`.
    ///
    /// Returns `Ok(false)` when the signature simply does not match, and an
    /// error when the signature text or the key cannot be used at all.
    fn verify(&self, data: &[u8], signature_b64: &str) -> ApiSecurityResult<bool>;
}

/// Decode a base64 signature, treating bad encoding as malformed input.
pub(crate) fn decode_signature(signature_b64: &str) -> ApiSecurityResult<Vec<u8>> {
    BASE64.decode(signature_b64.trim()).map_err(|e| {
        ApiSecurityError::signature(SignatureErrorKind::MalformedSignature {
            message: format!("signature is not valid base64: {}", e),
        })
    })
}
