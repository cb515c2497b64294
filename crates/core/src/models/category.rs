use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A category attached to a transaction or one of its asset movements.
///
/// Upstream sends either a bare label (`"swap"`) or a record carrying one
/// (`{"label": "swap", "name": "Swap"}`). Both forms resolve into the same
/// key space through [`CategoryRef::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Label(String),
    Record {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl CategoryRef {
    pub fn label(label: impl Into<String>) -> Self {
        CategoryRef::Label(label.into())
    }

    /// Resolve to a category key. Records are tried `label`, then `key`, then
    /// `name`. Blank strings count as absent; `None` means "no category".
    pub fn key(&self) -> Option<&str> {
        let candidate = match self {
            CategoryRef::Label(label) => Some(label.as_str()),
            CategoryRef::Record { label, key, name } => [label, key, name]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .find(|s| !s.trim().is_empty()),
        };
        candidate.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Zero or more categories at one structural level.
///
/// Deserializes from null, a single label, a single record, or an array mixing
/// both. Entries that are neither a string nor an object are discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategorySet(pub Vec<CategoryRef>);

impl CategorySet {
    pub fn new(categories: Vec<CategoryRef>) -> Self {
        Self(categories)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRef> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for CategorySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        let items = match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(single) => vec![single],
        };
        let categories = items
            .into_iter()
            .filter(|v| v.is_string() || v.is_object())
            .filter_map(|v| serde_json::from_value::<CategoryRef>(v).ok())
            .collect();
        Ok(Self(categories))
    }
}

impl From<Vec<CategoryRef>> for CategorySet {
    fn from(categories: Vec<CategoryRef>) -> Self {
        Self(categories)
    }
}
