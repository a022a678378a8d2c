//! Request parameters and their canonical signing form.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::error::{ApiSecurityError, ApiSecurityResult};

/// Client nonce field.
pub const CNONCE: &str = "cnonce";
/// Server nonce field.
pub const SNONCE: &str = "snonce";
/// Asymmetric signature field.
pub const SIG: &str = "sig";
/// HMAC field.
pub const HMAC: &str = "hmac";

/// Field names applications must not use for their own data.
pub const RESERVED_FIELDS: [&str; 4] = [CNONCE, SNONCE, SIG, HMAC];

/// A flat map of request field names to string values.
///
/// Fields are kept sorted by name, so the canonical string depends only on
/// the set of fields and their values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    fields: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, returning its previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Get a field, treating an empty value as absent.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.fields.iter()
    }

    /// A copy of these parameters without `name`.
    pub fn without(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.remove(name);
        copy
    }

    /// Names of reserved fields present in these parameters.
    pub fn reserved_fields(&self) -> Vec<&'static str> {
        RESERVED_FIELDS
            .iter()
            .copied()
            .filter(|name| self.contains(name))
            .collect()
    }

    /// The canonical signing string: `name=value` pairs in name order,
    /// percent-encoded and joined by `&`.
    pub fn canonical_string(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Serialise as a query string. Identical to the canonical string.
    pub fn to_query(&self) -> String {
        self.canonical_string()
    }

    /// Parse a query string such as `a=1&b=two%20words`.
    ///
    /// A leading `?` is ignored and `+` decodes to a space. Repeated field
    /// names are rejected.
    pub fn from_query(query: &str) -> ApiSecurityResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::new();

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode_component(name)?;
            let value = decode_component(value)?;

            if name.is_empty() {
                return Err(ApiSecurityError::Params {
                    message: format!("empty field name in '{}'", pair),
                });
            }
            if params.contains(&name) {
                return Err(ApiSecurityError::Params {
                    message: format!("field '{}' appears more than once", name),
                });
            }
            params.insert(name, value);
        }

        Ok(params)
    }
}

fn decode_component(component: &str) -> ApiSecurityResult<String> {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ApiSecurityError::Params {
            message: format!("invalid percent-encoding in '{}': {}", component, e),
        })
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for RequestParams {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl<'a> IntoIterator for &'a RequestParams {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
