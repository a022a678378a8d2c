//! Client-side request signing.

use tracing::{debug, error};

use crate::error::{ApiSecurityError, ApiSecurityResult, KeyErrorKind};
use crate::keys::{KeyMaterial, KeyPair, SharedKey};
use crate::nonce::{Nonce, DEFAULT_NONCE_LENGTH};
use crate::protocol::{RequestParams, CNONCE, HMAC, SIG};

/// Signs outgoing request parameters.
///
/// Every signature or HMAC is computed over the parameters plus a fresh
/// client nonce, so identical requests never carry identical signatures.
///
/// ```no_run
/// use api_security::auth::Signer;
/// use api_security::keys::KeyPair;
/// use api_security::protocol::RequestParams;
/// use std::path::Path;
///
/// let key_pair = KeyPair::load(None, Some(Path::new("private.pem")))?;
/// let signer = Signer::new().with_key_pair(key_pair);
///
/// let mut params = RequestParams::new().with("fox", "quick");
/// let signature = signer.create_signature(&mut params);
/// # Ok::<(), api_security::error::ApiSecurityError>(())
/// ```
#[derive(Debug)]
pub struct Signer {
    key_pair: Option<KeyPair>,
    shared_key: Option<SharedKey>,
    nonce_length: usize,
}

impl Default for Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer {
    /// Create a signer with no keys and the default nonce length.
    pub fn new() -> Self {
        Self {
            key_pair: None,
            shared_key: None,
            nonce_length: DEFAULT_NONCE_LENGTH,
        }
    }

    /// Use `key_pair` (its private half) for signatures.
    pub fn with_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Use `shared_key` for HMACs.
    pub fn with_shared_key(mut self, shared_key: SharedKey) -> Self {
        self.shared_key = Some(shared_key);
        self
    }

    /// Set the number of random bytes in generated client nonces.
    pub fn with_nonce_length(mut self, nonce_length: usize) -> Self {
        self.nonce_length = nonce_length;
        self
    }

    /// Generate a client nonce.
    pub fn create_nonce(&self) -> Nonce {
        Nonce::with_length(self.nonce_length)
    }

    /// Sign the parameters with the private key.
    ///
    /// Adds `cnonce` and `sig` to `params` and returns the signature. If no
    /// usable private key is configured the failure is logged, `params` is
    /// left without a `sig` field, and `None` is returned.
    pub fn create_signature(&self, params: &mut RequestParams) -> Option<String> {
        let result = match &self.key_pair {
            Some(key_pair) => self.sign_params(params, SIG, key_pair),
            None => Err(ApiSecurityError::key(KeyErrorKind::MissingPrivateKey)),
        };

        match result {
            Ok(signature) => Some(signature),
            Err(e) => {
                error!(error = %e, "Failed to sign request parameters");
                None
            }
        }
    }

    /// Compute an HMAC of the parameters with the shared key.
    ///
    /// Adds `cnonce` and `hmac` to `params` and returns the HMAC. Fails only
    /// when no shared key is configured.
    pub fn create_hmac(&self, params: &mut RequestParams) -> ApiSecurityResult<String> {
        let shared_key = self
            .shared_key
            .as_ref()
            .ok_or_else(|| ApiSecurityError::key(KeyErrorKind::MissingSharedKey))?;

        self.sign_params(params, HMAC, shared_key)
    }

    fn sign_params(
        &self,
        params: &mut RequestParams,
        field: &'static str,
        key: &dyn KeyMaterial,
    ) -> ApiSecurityResult<String> {
        // A stale value from an earlier signing must not be signed over
        params.remove(field);

        let cnonce = self.create_nonce();
        params.insert(CNONCE, cnonce.token());

        let canonical = params.canonical_string();
        let signature = key.sign(canonical.as_bytes())?;
        params.insert(field, signature.clone());

        debug!(field, cnonce = cnonce.token(), "Request parameters signed");
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_key_pair;

    fn sample() -> RequestParams {
        RequestParams::new()
            .with("fox", "quick")
            .with("colour", "brown")
            .with("dog", "lazy")
    }

    fn signer() -> Signer {
        let key_pair = KeyPair::from_pem(None, test_key_pair().private_key_pem()).unwrap();
        Signer::new().with_key_pair(key_pair)
    }

    #[test]
    fn test_create_signature_adds_fields() {
        let mut params = sample();
        let signature = signer().create_signature(&mut params).unwrap();

        assert_eq!(params.get(CNONCE).unwrap().len(), 24);
        assert_eq!(params.get(SIG), Some(signature.as_str()));
        assert_eq!(params.get("fox"), Some("quick"));
    }

    #[test]
    fn test_signature_covers_nonce() {
        let mut params = sample();
        let signature = signer().create_signature(&mut params).unwrap();

        let unsigned = params.without(SIG);
        assert!(test_key_pair()
            .verify(unsigned.canonical_string().as_bytes(), &signature)
            .unwrap());
    }

    #[test]
    fn test_identical_requests_get_different_signatures() {
        let signer = signer();
        let mut first = sample();
        let mut second = sample();

        let a = signer.create_signature(&mut first).unwrap();
        let b = signer.create_signature(&mut second).unwrap();
        assert_ne!(a, b);
        assert_ne!(first.get(CNONCE), second.get(CNONCE));
    }

    #[test]
    fn test_resigning_replaces_signature() {
        let signer = signer();
        let mut params = sample();
        signer.create_signature(&mut params).unwrap();
        let second = signer.create_signature(&mut params).unwrap();

        let unsigned = params.without(SIG);
        assert!(test_key_pair()
            .verify(unsigned.canonical_string().as_bytes(), &second)
            .unwrap());
    }

    #[test]
    fn test_missing_private_key_returns_none() {
        let signer = Signer::new().with_key_pair(test_key_pair().public_only());
        let mut params = sample();

        assert_eq!(signer.create_signature(&mut params), None);
        assert!(!params.contains(SIG));

        let mut params = sample();
        assert_eq!(Signer::new().create_signature(&mut params), None);
        assert!(!params.contains(SIG));
    }

    #[test]
    fn test_create_hmac() {
        let key = SharedKey::new("i9DEgKMbGayMEAusiYswcex1LHfEsodb").unwrap();
        let signer = Signer::new().with_shared_key(key);
        let mut params = sample();

        let hmac = signer.create_hmac(&mut params).unwrap();
        assert!(!hmac.is_empty());
        assert_eq!(params.get(HMAC), Some(hmac.as_str()));
        assert!(params.contains(CNONCE));
    }

    #[test]
    fn test_create_hmac_without_key() {
        let mut params = sample();
        let result = Signer::new().create_hmac(&mut params);
        assert!(matches!(
            result,
            Err(ApiSecurityError::Key {
                kind: KeyErrorKind::MissingSharedKey
            })
        ));
    }

    #[test]
    fn test_custom_nonce_length() {
        let signer = Signer::new().with_nonce_length(32);
        assert_eq!(signer.create_nonce().token().len(), 44);
    }
}
