//! Key material module.
//!
//! Asymmetric RSA key pairs for request signatures, shared secrets for
//! HMACs, and the file storage both use.

mod key_pair;
mod material;
mod shared_key;
mod storage;

pub use key_pair::{KeyPair, DEFAULT_KEY_BITS};
pub use material::KeyMaterial;
pub use shared_key::{SharedKey, DEFAULT_SHARED_KEY_BYTES};

/// A key pair generated once for the whole unit test run.
#[cfg(test)]
pub(crate) fn test_key_pair() -> &'static KeyPair {
    use std::sync::OnceLock;

    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate(DEFAULT_KEY_BITS).expect("key generation"))
}
