use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::fetch::RequestKey;
use super::interval::DateRange;
use crate::errors::CoreError;
use crate::storage::cache_key::QueryIdentity;

/// Current holdings of one or more wallets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioQuery {
    pub addresses: Vec<String>,
    /// Bypass the cache read. The fresh result is still written back.
    #[serde(default)]
    pub force_refresh: bool,
}

/// Holdings of one or more wallets at each of several dates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoricalQuery {
    pub addresses: Vec<String>,
    pub dates: Vec<NaiveDate>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Every transaction of one or more wallets within a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub addresses: Vec<String>,
    pub range: DateRange,
    #[serde(default)]
    pub force_refresh: bool,
}

impl PortfolioQuery {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            force_refresh: false,
        }
    }

    pub fn refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Validated request keys, one per distinct address.
    pub fn keys(&self) -> Result<Vec<RequestKey>, CoreError> {
        Ok(normalize_addresses(&self.addresses)?
            .into_iter()
            .map(RequestKey::address)
            .collect())
    }

    pub fn identity(&self) -> Result<QueryIdentity, CoreError> {
        let addresses = normalize_addresses(&self.addresses)?;
        Ok(QueryIdentity::new("portfolio").list_param("addresses", addresses))
    }
}

impl HistoricalQuery {
    pub fn new<I, S>(addresses: I, dates: Vec<NaiveDate>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            dates,
            force_refresh: false,
        }
    }

    pub fn refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Distinct dates, ascending.
    pub fn normalized_dates(&self) -> Result<Vec<NaiveDate>, CoreError> {
        let dates: BTreeSet<NaiveDate> = self.dates.iter().copied().collect();
        if dates.is_empty() {
            return Err(CoreError::ValidationError(
                "at least one snapshot date is required".into(),
            ));
        }
        Ok(dates.into_iter().collect())
    }

    /// One key per address × date.
    pub fn keys(&self) -> Result<Vec<RequestKey>, CoreError> {
        let addresses = normalize_addresses(&self.addresses)?;
        let dates = self.normalized_dates()?;
        Ok(addresses
            .iter()
            .flat_map(|address| {
                dates
                    .iter()
                    .map(move |date| RequestKey::dated(address.clone(), *date))
            })
            .collect())
    }

    pub fn identity(&self) -> Result<QueryIdentity, CoreError> {
        Ok(QueryIdentity::new("historical")
            .list_param("addresses", normalize_addresses(&self.addresses)?)
            .list_param("dates", self.normalized_dates()?))
    }
}

impl TransactionQuery {
    pub fn new<I, S>(addresses: I, range: DateRange) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            range,
            force_refresh: false,
        }
    }

    pub fn refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    fn validated_range(&self) -> Result<DateRange, CoreError> {
        // Deserialized ranges bypass DateRange::new
        DateRange::new(self.range.start, self.range.end)
    }

    pub fn keys(&self) -> Result<Vec<RequestKey>, CoreError> {
        self.validated_range()?;
        Ok(normalize_addresses(&self.addresses)?
            .into_iter()
            .map(RequestKey::address)
            .collect())
    }

    pub fn identity(&self) -> Result<QueryIdentity, CoreError> {
        let range = self.validated_range()?;
        Ok(QueryIdentity::new("transactions")
            .list_param("addresses", normalize_addresses(&self.addresses)?)
            .param("from", range.start)
            .param("to", range.end))
    }
}

/// Trim, lowercase, dedupe and sort. Rejects an empty result.
pub fn normalize_addresses(addresses: &[String]) -> Result<Vec<String>, CoreError> {
    let normalized: BTreeSet<String> = addresses
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    if normalized.is_empty() {
        return Err(CoreError::ValidationError(
            "at least one wallet address is required".into(),
        ));
    }
    Ok(normalized.into_iter().collect())
}
