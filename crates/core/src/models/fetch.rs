use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Identity of one upstream request within a fan-out: an address, optionally
/// paired with a snapshot date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl RequestKey {
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            date: None,
        }
    }

    pub fn dated(address: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            address: address.into(),
            date: Some(date),
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.date {
            Some(date) => write!(f, "{}@{}", self.address, date),
            None => write!(f, "{}", self.address),
        }
    }
}

/// One key that failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub key: RequestKey,
    pub reason: String,
}

/// Outcome class of a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Every key succeeded
    TotalSuccess,
    /// At least one key succeeded and at least one failed
    PartialSuccess,
    /// No key succeeded
    TotalFailure,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::TotalSuccess => write!(f, "total success"),
            Disposition::PartialSuccess => write!(f, "partial success"),
            Disposition::TotalFailure => write!(f, "total failure"),
        }
    }
}

/// Combined result of a fan-out: the successful results keyed by request,
/// plus an explicit list of the keys that failed.
///
/// A partial success is a usable value. Callers render `combined` and show
/// `errors` alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct FanOutResult<T> {
    #[serde(with = "keyed_entries")]
    pub combined: BTreeMap<RequestKey, T>,
    pub errors: Vec<FetchFailure>,
    /// True when served from the cache without touching upstream
    #[serde(default)]
    pub from_cache: bool,
}

impl<T> FanOutResult<T> {
    pub fn new(combined: BTreeMap<RequestKey, T>, errors: Vec<FetchFailure>) -> Self {
        Self {
            combined,
            errors,
            from_cache: false,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match (self.combined.is_empty(), self.errors.is_empty()) {
            (_, true) => Disposition::TotalSuccess,
            (false, false) => Disposition::PartialSuccess,
            (true, false) => Disposition::TotalFailure,
        }
    }

    pub fn is_total_success(&self) -> bool {
        self.disposition() == Disposition::TotalSuccess
    }

    pub fn failed_keys(&self) -> Vec<&RequestKey> {
        self.errors.iter().map(|f| &f.key).collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.combined.values()
    }

    /// Results for one snapshot date across every address.
    pub fn for_date(&self, date: NaiveDate) -> impl Iterator<Item = &T> {
        self.combined
            .iter()
            .filter(move |(key, _)| key.date == Some(date))
            .map(|(_, value)| value)
    }
}

/// JSON object keys must be strings, so the combined map is written as a
/// list of `{key, value}` pairs.
mod keyed_entries {
    use super::*;

    #[derive(Serialize)]
    struct EntryRef<'a, T> {
        key: &'a RequestKey,
        value: &'a T,
    }

    #[derive(Deserialize)]
    struct Entry<T> {
        key: RequestKey,
        value: T,
    }

    pub fn serialize<S, T>(map: &BTreeMap<RequestKey, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.iter().map(|(key, value)| EntryRef { key, value }))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<RequestKey, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let entries = Vec::<Entry<T>>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }
}
