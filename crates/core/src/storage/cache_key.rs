use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Parameters that only change freshness semantics. They never enter a key:
/// a forced refresh must overwrite the same entry a normal query reads.
const FRESHNESS_PARAMS: &[&str] = &["force_refresh", "forceRefresh", "refresh"];

/// Full logical identity of a query: its kind plus every parameter that
/// affects the result.
///
/// Parameters are held sorted, so insertion order never changes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIdentity {
    kind: String,
    params: BTreeMap<String, String>,
}

impl QueryIdentity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter. Freshness-only parameters are ignored.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        if !FRESHNESS_PARAMS.contains(&name.as_str()) {
            self.params.insert(name, value.to_string());
        }
        self
    }

    /// Add a list-valued parameter, joined with commas in the given order.
    pub fn list_param<I, S>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let joined = values
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.param(name, joined)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Human-readable canonical form, stored in entries for diagnostics.
    pub fn canonical(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.kind, query)
    }

    /// SHA-256 of the canonical form, hex-encoded. Used as the entry name.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }
}
