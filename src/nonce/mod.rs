//! Nonce module.
//!
//! Generates single-use nonces and tracks which have been consumed so
//! identical request payloads cannot be replayed.

mod cache;
mod generator;
mod ledger;

pub use cache::{MemoryCache, NonceCache};
pub use generator::{Nonce, DEFAULT_NONCE_LENGTH};
pub use ledger::{NonceLedger, USED};
