//! Error types for request signing and verification.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum ApiSecurityError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Key loading, generation and usage errors.
    #[error("Key error: {kind}")]
    Key { kind: KeyErrorKind },

    /// Signature and HMAC errors.
    #[error("Signature error: {kind}")]
    Signature { kind: SignatureErrorKind },

    /// Nonce replay protection errors.
    #[error("Nonce error: {kind}")]
    Nonce { kind: NonceErrorKind },

    /// Request parameter encoding errors.
    #[error("Parameter error: {message}")]
    Params { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key error kinds.
#[derive(Error, Debug)]
pub enum KeyErrorKind {
    #[error("No private key is available for signing")]
    MissingPrivateKey,

    #[error("No public key is available for verification")]
    MissingPublicKey,

    #[error("Invalid private key: {message}")]
    InvalidPrivateKey { message: String },

    #[error("Invalid public key: {message}")]
    InvalidPublicKey { message: String },

    #[error("No shared key is available for HMAC calculation")]
    MissingSharedKey,

    #[error("Key generation failed: {message}")]
    Generation { message: String },

    #[error("Key file {path} has insecure permissions {mode:04o}, expected 0600 or 0400")]
    InsecurePermissions { path: PathBuf, mode: u32 },

    #[error("Failed to read key file {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// Signature error kinds.
#[derive(Error, Debug)]
pub enum SignatureErrorKind {
    #[error("No {field} was present on the request data")]
    NoSignature { field: &'static str },

    #[error("The signature on the request data did not verify")]
    InvalidSignature,

    #[error("Malformed signature: {message}")]
    MalformedSignature { message: String },

    #[error("Signing failed: {message}")]
    SigningFailed { message: String },
}

/// Nonce error kinds.
#[derive(Error, Debug)]
pub enum NonceErrorKind {
    #[error("No client nonce was present in signature verification")]
    MissingClientNonce,

    #[error("Client nonce already used (replay attack detected)")]
    ReplayedClientNonce,

    #[error("Server nonce was never issued")]
    ServerNonceUnknown,

    #[error("Server nonce already used")]
    ServerNonceUsed,

    #[error("Server nonce was issued to a different address than {ip}")]
    ServerNonceWrongIp { ip: String },
}

impl NonceErrorKind {
    /// True for the server nonce failures (unknown, used, or wrong address).
    pub fn is_server_nonce(&self) -> bool {
        matches!(
            self,
            Self::ServerNonceUnknown | Self::ServerNonceUsed | Self::ServerNonceWrongIp { .. }
        )
    }
}

impl ApiSecurityError {
    pub(crate) fn key(kind: KeyErrorKind) -> Self {
        Self::Key { kind }
    }

    pub(crate) fn signature(kind: SignatureErrorKind) -> Self {
        Self::Signature { kind }
    }

    pub(crate) fn nonce(kind: NonceErrorKind) -> Self {
        Self::Nonce { kind }
    }
}

/// Result type alias for crate operations.
pub type ApiSecurityResult<T> = Result<T, ApiSecurityError>;
