//! Error types for API request security.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
