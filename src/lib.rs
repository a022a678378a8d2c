//! API Security Library
//!
//! Signs outgoing API request parameters with an RSA private key or a shared
//! HMAC secret, and verifies them on the server with the matching public or
//! shared key. Client and server nonces, tracked in a pluggable cache, stop
//! identical request payloads from being replayed.

pub mod auth;
pub mod config;
pub mod error;
pub mod keys;
pub mod nonce;
pub mod protocol;
