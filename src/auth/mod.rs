//! Authentication module.
//!
//! Client-side signing of request parameters and server-side verification
//! with nonce replay protection.

mod signer;
mod verifier;

pub use signer::Signer;
pub use verifier::Verifier;
