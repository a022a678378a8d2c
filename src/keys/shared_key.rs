//! HMAC-SHA256 shared secrets.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;

use crate::error::{ApiSecurityError, ApiSecurityResult, KeyErrorKind};

use super::material::{decode_signature, KeyMaterial};
use super::storage::{read_secret_file, write_secret_file};

/// Number of random bytes in a generated shared secret.
pub const DEFAULT_SHARED_KEY_BYTES: usize = 32;

/// A secret shared between client and server for HMAC calculation.
pub struct SharedKey {
    secret: Vec<u8>,
    key: hmac::Key,
}

impl SharedKey {
    /// Create a shared key from raw secret bytes.
    ///
    /// An empty secret is rejected.
    pub fn new(secret: impl Into<Vec<u8>>) -> ApiSecurityResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ApiSecurityError::key(KeyErrorKind::MissingSharedKey));
        }
        let key = hmac::Key::new(hmac::HMAC_SHA256, &secret);
        Ok(Self { secret, key })
    }

    /// Load a shared secret from a file.
    ///
    /// The whole file content is the secret. The file must have restrictive
    /// permissions (0600 or 0400).
    pub fn load(path: &Path) -> ApiSecurityResult<Self> {
        let secret = read_secret_file(path)?;
        debug!(path = %path.display(), "Shared key loaded");
        Self::new(secret)
    }

    /// Generate a new shared secret from `byte_length` random bytes.
    ///
    /// The secret is the base64 text of those bytes so it can be pasted into
    /// client configuration.
    pub fn generate(byte_length: usize) -> ApiSecurityResult<Self> {
        let mut bytes = vec![0u8; byte_length];
        SystemRandom::new().fill(&mut bytes).map_err(|e| {
            ApiSecurityError::key(KeyErrorKind::Generation {
                message: format!("random source failed: {}", e),
            })
        })?;
        Self::new(BASE64.encode(&bytes))
    }

    /// Write the secret to a file with mode 0600.
    pub fn store(&self, path: &Path) -> ApiSecurityResult<()> {
        write_secret_file(path, &self.secret)
    }

    /// The raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl KeyMaterial for SharedKey {
    fn sign(&self, data: &[u8]) -> ApiSecurityResult<String> {
        let tag = hmac::sign(&self.key, data);
        Ok(BASE64.encode(tag.as_ref()))
    }

    fn verify(&self, data: &[u8], signature_b64: &str) -> ApiSecurityResult<bool> {
        let tag = decode_signature(signature_b64)?;
        // ring compares tags in constant time
        Ok(hmac::verify(&self.key, data, &tag).is_ok())
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKey")
            .field("length", &self.secret.len())
            .finish()
    }
}
