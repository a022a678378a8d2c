//! Client and server nonce generation.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

use crate::error::{ApiSecurityError, ApiSecurityResult};

/// Default number of random bytes in a nonce.
pub const DEFAULT_NONCE_LENGTH: usize = 16;

/// A single-use random token.
///
/// The textual form is the standard (padded) base64 encoding of the raw
/// bytes. Uniqueness is not guaranteed by construction; the nonce ledger is
/// what rejects reuse.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce {
    bytes: Vec<u8>,
    token: String,
    degraded: bool,
}

impl Nonce {
    /// Generate a nonce of the default length.
    pub fn generate() -> Self {
        Self::with_length(DEFAULT_NONCE_LENGTH)
    }

    /// Generate a nonce of `byte_length` random bytes.
    ///
    /// Bytes come from the operating system generator. If that fails the
    /// nonce is filled from the thread-local generator instead and marked
    /// degraded; generation itself never fails.
    pub fn with_length(byte_length: usize) -> Self {
        let rng = SystemRandom::new();
        Self::with_source(byte_length, |bytes| rng.fill(bytes))
    }

    /// Generate a nonce from `fill`, falling back to the thread-local
    /// generator if it fails.
    fn with_source(
        byte_length: usize,
        fill: impl FnOnce(&mut [u8]) -> Result<(), Unspecified>,
    ) -> Self {
        let mut bytes = vec![0u8; byte_length];
        let degraded = match fill(&mut bytes) {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, byte_length, "System random source failed, nonce randomness is degraded");
                rand::thread_rng().fill_bytes(&mut bytes);
                true
            }
        };
        Self::build(bytes, degraded)
    }

    /// Wrap existing bytes as a nonce.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::build(bytes.into(), false)
    }

    /// Decode a nonce from its textual token.
    pub fn decode(token: &str) -> ApiSecurityResult<Self> {
        let bytes = BASE64.decode(token).map_err(|e| ApiSecurityError::Params {
            message: format!("nonce is not valid base64: {}", e),
        })?;
        Ok(Self::build(bytes, false))
    }

    /// Length in characters of the token for a nonce of `byte_length` bytes.
    pub fn token_length(byte_length: usize) -> usize {
        byte_length.div_ceil(3) * 4
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn into_token(self) -> String {
        self.token
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the bytes came from the fallback generator.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn build(bytes: Vec<u8>, degraded: bool) -> Self {
        let token = BASE64.encode(&bytes);
        Self {
            bytes,
            token,
            degraded,
        }
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nonce")
            .field("token", &self.token)
            .field("degraded", &self.degraded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_nonce() {
        let nonce = Nonce::generate();
        assert_eq!(nonce.byte_length(), 16);
        assert_eq!(nonce.bytes().len(), 16);
        assert_eq!(nonce.token().len(), 24);
        assert!(!nonce.is_degraded());
    }

    #[test]
    fn test_token_length() {
        assert_eq!(Nonce::token_length(16), 24);
        assert_eq!(Nonce::token_length(1), 4);
        assert_eq!(Nonce::token_length(3), 4);
        assert_eq!(Nonce::token_length(32), 44);

        for len in [1, 2, 3, 8, 16, 20, 32] {
            assert_eq!(Nonce::with_length(len).token().len(), Nonce::token_length(len));
        }
    }

    #[test]
    fn test_decode_recovers_bytes() {
        let nonce = Nonce::generate();
        let decoded = Nonce::decode(nonce.token()).unwrap();
        assert_eq!(decoded.bytes(), nonce.bytes());
        assert_eq!(decoded, nonce);
    }

    #[test]
    fn test_known_encoding() {
        let nonce = Nonce::from_bytes(b"hello".to_vec());
        assert_eq!(nonce.token(), "aGVsbG8=");
        assert_eq!(nonce.to_string(), "aGVsbG8=");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Nonce::decode("not base64!").is_err());
    }

    #[test]
    fn test_nonces_differ() {
        assert_ne!(Nonce::generate().token(), Nonce::generate().token());
    }

    #[test]
    fn test_failing_source_falls_back_to_degraded_nonce() {
        let nonce = Nonce::with_source(16, |_| Err(Unspecified));

        assert!(nonce.is_degraded());
        assert_eq!(nonce.byte_length(), 16);
        assert_eq!(nonce.token().len(), Nonce::token_length(16));
        assert!(nonce.bytes().iter().any(|&b| b != 0));
        assert_eq!(Nonce::decode(nonce.token()).unwrap().bytes(), nonce.bytes());
    }

    #[test]
    fn test_working_source_is_not_degraded() {
        let nonce = Nonce::with_source(8, |bytes| {
            bytes.fill(0xAB);
            Ok(())
        });

        assert!(!nonce.is_degraded());
        assert_eq!(nonce.bytes(), &[0xAB; 8]);
    }
}
