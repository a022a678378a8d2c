//! Request parameter protocol.
//!
//! Defines the flat parameter map exchanged between client and server, the
//! reserved field names, and the canonical string signatures are computed
//! over.
//!
//! ## Canonical Form
//!
//! ```text
//! name1=value1&name2=value2&...
//! ```
//!
//! Fields are ordered by name; names and values are percent-encoded. The
//! signature field itself is excluded.

mod params;

pub use params::{RequestParams, CNONCE, HMAC, RESERVED_FIELDS, SIG, SNONCE};
