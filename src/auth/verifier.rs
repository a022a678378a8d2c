//! Server-side request verification.

use std::net::IpAddr;

use tracing::{debug, error, warn};

use crate::error::{
    ApiSecurityError, ApiSecurityResult, KeyErrorKind, NonceErrorKind, SignatureErrorKind,
};
use crate::keys::{KeyMaterial, KeyPair, SharedKey};
use crate::nonce::{Nonce, NonceLedger, DEFAULT_NONCE_LENGTH};
use crate::protocol::{RequestParams, CNONCE, HMAC, SIG, SNONCE};

/// Attempts at issuing a server nonce before giving up on a colliding token.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Verifies signed request parameters and enforces nonce replay rules.
///
/// Checks run in a fixed order, each failure ending verification:
/// 1. Signature field is present
/// 2. Signature (or HMAC) is valid over the remaining fields
/// 3. Client nonce is present
/// 4. Client nonce has not been used before (it is consumed here)
/// 5. Server nonce, if present, was issued to this address and is unused
#[derive(Debug)]
pub struct Verifier {
    key_pair: Option<KeyPair>,
    shared_key: Option<SharedKey>,
    ledger: NonceLedger,
    nonce_length: usize,
}

impl Verifier {
    /// Create a verifier recording nonce state in `ledger`.
    pub fn new(ledger: NonceLedger) -> Self {
        Self {
            key_pair: None,
            shared_key: None,
            ledger,
            nonce_length: DEFAULT_NONCE_LENGTH,
        }
    }

    /// Use `key_pair` (its public half) to verify signatures.
    pub fn with_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Use `shared_key` to verify HMACs.
    pub fn with_shared_key(mut self, shared_key: SharedKey) -> Self {
        self.shared_key = Some(shared_key);
        self
    }

    /// Set the number of random bytes in issued server nonces.
    pub fn with_nonce_length(mut self, nonce_length: usize) -> Self {
        self.nonce_length = nonce_length;
        self
    }

    pub fn ledger(&self) -> &NonceLedger {
        &self.ledger
    }

    /// Issue a one-time server nonce to the client at `ip`.
    ///
    /// The client must echo the returned token back as `snonce`.
    pub fn create_nonce(&self, ip: IpAddr) -> String {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = Nonce::with_length(self.nonce_length).into_token();
            if self.record_server_nonce(&token, ip) {
                debug!(%ip, "Server nonce issued");
                return token;
            }
        }

        error!(%ip, "Failed to record server nonce, it will not verify");
        Nonce::with_length(self.nonce_length).into_token()
    }

    /// Record a server nonce as issued to `ip`.
    ///
    /// Returns `false` if the token was already recorded.
    pub fn record_server_nonce(&self, snonce: &str, ip: IpAddr) -> bool {
        self.ledger.issue_server_nonce(snonce, ip)
    }

    /// Check and consume a client nonce.
    pub fn verify_client_nonce(&self, cnonce: &str) -> ApiSecurityResult<()> {
        self.ledger.consume_client_nonce(cnonce)
    }

    /// Check and consume a server nonce presented from `ip`.
    pub fn verify_server_nonce(&self, snonce: &str, ip: IpAddr) -> ApiSecurityResult<()> {
        self.ledger.consume_server_nonce(snonce, ip)
    }

    /// Verify the `sig` field of a request received from `ip`.
    pub fn verify_signature(&self, params: &RequestParams, ip: IpAddr) -> ApiSecurityResult<()> {
        let key = self.key_pair.as_ref().map(|k| k as &dyn KeyMaterial);
        self.verify_params(params, SIG, key, KeyErrorKind::MissingPublicKey, ip)
    }

    /// Verify the `hmac` field of a request received from `ip`.
    pub fn verify_hmac(&self, params: &RequestParams, ip: IpAddr) -> ApiSecurityResult<()> {
        let key = self.shared_key.as_ref().map(|k| k as &dyn KeyMaterial);
        self.verify_params(params, HMAC, key, KeyErrorKind::MissingSharedKey, ip)
    }

    fn verify_params(
        &self,
        params: &RequestParams,
        field: &'static str,
        key: Option<&dyn KeyMaterial>,
        missing_key: KeyErrorKind,
        ip: IpAddr,
    ) -> ApiSecurityResult<()> {
        let Some(supplied) = params.get_non_empty(field) else {
            warn!(field, %ip, "Request rejected: no signature present");
            return Err(ApiSecurityError::signature(SignatureErrorKind::NoSignature { field }));
        };

        let key = key.ok_or_else(|| ApiSecurityError::key(missing_key))?;

        let unsigned = params.without(field);
        let canonical = unsigned.canonical_string();

        match key.verify(canonical.as_bytes(), supplied) {
            Ok(true) => {}
            Ok(false) => {
                warn!(field, %ip, "Request rejected: signature did not verify");
                return Err(ApiSecurityError::signature(
                    SignatureErrorKind::InvalidSignature,
                ));
            }
            Err(ApiSecurityError::Signature {
                kind: SignatureErrorKind::MalformedSignature { message },
            }) => {
                warn!(field, %ip, %message, "Request rejected: malformed signature");
                return Err(ApiSecurityError::signature(
                    SignatureErrorKind::InvalidSignature,
                ));
            }
            Err(e) => return Err(e),
        }

        let Some(cnonce) = unsigned.get_non_empty(CNONCE) else {
            warn!(field, %ip, "Request rejected: no client nonce present");
            return Err(ApiSecurityError::nonce(NonceErrorKind::MissingClientNonce));
        };
        self.ledger.consume_client_nonce(cnonce)?;

        if let Some(snonce) = unsigned.get_non_empty(SNONCE) {
            self.ledger.consume_server_nonce(snonce, ip)?;
        }

        debug!(field, %ip, "Request verified");
        Ok(())
    }
}
