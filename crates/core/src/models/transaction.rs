use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::CategorySet;
use super::numeric::{lenient_opt_string, lenient_string, parse_decimal};

/// Unix timestamps above this magnitude are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A timestamped financial event.
///
/// Categories can sit at four levels: on the transaction itself, on each
/// inbound movement, on each outbound movement and on each native-fee
/// movement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub hash: String,

    /// Unix seconds or milliseconds, or an RFC 3339 string
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,

    #[serde(default)]
    pub chain: String,

    #[serde(default, alias = "category", alias = "type")]
    pub categories: CategorySet,

    #[serde(default)]
    pub assets_in: Vec<AssetMovement>,

    #[serde(default)]
    pub assets_out: Vec<AssetMovement>,

    #[serde(default)]
    pub native_asset_fees: Vec<AssetMovement>,
}

impl Transaction {
    pub fn new(hash: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    /// The transaction time in UTC, `None` when the timestamp is unusable.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(n) = raw.parse::<i64>() {
            return if n.abs() >= MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(n)
            } else {
                DateTime::from_timestamp(n, 0)
            };
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn inbound_total(&self) -> f64 {
        self.assets_in.iter().map(AssetMovement::numeric_value).sum()
    }

    pub fn outbound_total(&self) -> f64 {
        self.assets_out.iter().map(AssetMovement::numeric_value).sum()
    }

    pub fn fee_total(&self) -> f64 {
        self.native_asset_fees
            .iter()
            .map(AssetMovement::numeric_value)
            .sum()
    }

    /// Inbound minus outbound movement value.
    pub fn net_value(&self) -> f64 {
        self.inbound_total() - self.outbound_total()
    }
}

/// One asset moving into or out of the wallet as part of a transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetMovement {
    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub name: String,

    /// Fiat value of the movement, as a decimal string
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub balance: Option<String>,

    #[serde(default, alias = "category", skip_serializing_if = "CategorySet::is_empty")]
    pub categories: CategorySet,
}

impl AssetMovement {
    pub fn new(symbol: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_categories(mut self, categories: impl Into<CategorySet>) -> Self {
        self.categories = categories.into();
        self
    }

    pub fn numeric_value(&self) -> f64 {
        parse_decimal(&self.value)
    }
}
