//! Configuration module.
//!
//! Handles loading and validating key locations, nonce parameters and
//! logging options from TOML files.

mod settings;

pub use settings::*;
