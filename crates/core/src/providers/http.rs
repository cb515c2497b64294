use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::traits::PortfolioSource;
use crate::errors::CoreError;
use crate::models::interval::DateRange;
use crate::models::portfolio::Portfolio;
use crate::models::settings::Settings;
use crate::models::transaction::Transaction;

const PROVIDER: &str = "Octav";
/// How much of an error body ends up in the error message
const BODY_EXCERPT_CHARS: usize = 200;

/// Portfolio API over HTTP with bearer-token auth.
///
/// - **Endpoints**: `/portfolio`, `/historical`, `/transactions`
/// - **Auth**: `Authorization: Bearer <key>`
///
/// Single-address queries may come back as a one-element array; those are
/// unwrapped before decoding.
pub struct HttpPortfolioSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpPortfolioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPortfolioSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpPortfolioSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        Self::new(
            settings.api_base_url.clone(),
            settings.api_key.clone(),
            settings.request_timeout(),
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
    }

    async fn send_json(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<serde_json::Value, CoreError> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("{what} returned {status}: {excerpt}"),
            });
        }

        resp.json().await.map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to read {what} response: {e}"),
        })
    }
}

// ── Response shapes ─────────────────────────────────────────────────

/// Transactions may come wrapped or bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum TransactionsResponse {
    Wrapped { transactions: Vec<Transaction> },
    Bare(Vec<Transaction>),
}

impl TransactionsResponse {
    fn into_vec(self) -> Vec<Transaction> {
        match self {
            TransactionsResponse::Wrapped { transactions } => transactions,
            TransactionsResponse::Bare(transactions) => transactions,
        }
    }
}

/// Unwrap a one-element array, then decode.
fn decode_single<T: DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, CoreError> {
    let value = match value {
        serde_json::Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    decode(value, what)
}

fn decode<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> Result<T, CoreError> {
    serde_json::from_value(value).map_err(|e| CoreError::Api {
        provider: PROVIDER.into(),
        message: format!("Unexpected {what} payload: {e}"),
    })
}

#[async_trait]
impl PortfolioSource for HttpPortfolioSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_portfolio(&self, address: &str) -> Result<Portfolio, CoreError> {
        let request = self.get("portfolio").query(&[("addresses", address)]);
        decode_single(self.send_json(request, "portfolio").await?, "portfolio")
    }

    async fn fetch_historical_portfolio(
        &self,
        address: &str,
        date: NaiveDate,
    ) -> Result<Portfolio, CoreError> {
        let date = date.format("%Y-%m-%d").to_string();
        let request = self
            .get("historical")
            .query(&[("addresses", address), ("date", date.as_str())]);
        let what = "historical portfolio";
        decode_single(self.send_json(request, what).await?, what)
    }

    async fn fetch_transactions_page(
        &self,
        address: &str,
        range: &DateRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        let request = self.get("transactions").query(&[
            ("addresses", address.to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("startDate", range.start.format("%Y-%m-%d").to_string()),
            ("endDate", range.end.format("%Y-%m-%d").to_string()),
        ]);
        let value = self.send_json(request, "transactions").await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let page: TransactionsResponse = decode(value, "transactions")?;
        Ok(page.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_single_element_array() {
        let payload = json!([{ "address": "0xabc", "networth": "12.5" }]);
        let portfolio: Portfolio = decode_single(payload, "portfolio").unwrap();
        assert_eq!(portfolio.address, "0xabc");
    }

    #[test]
    fn accepts_bare_object() {
        let portfolio: Portfolio =
            decode_single(json!({ "address": "0xdef" }), "portfolio").unwrap();
        assert_eq!(portfolio.address, "0xdef");
    }

    #[test]
    fn rejects_wrong_shape_as_api_error() {
        let err = decode_single::<Portfolio>(json!("nope"), "portfolio").unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }));
    }

    #[test]
    fn transactions_accept_wrapped_and_bare() {
        let wrapped: TransactionsResponse =
            serde_json::from_value(json!({ "transactions": [{ "hash": "0x1" }] })).unwrap();
        assert_eq!(wrapped.into_vec().len(), 1);

        let bare: TransactionsResponse =
            serde_json::from_value(json!([{ "hash": "0x1" }, { "hash": "0x2" }])).unwrap();
        assert_eq!(bare.into_vec().len(), 2);
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let source =
            HttpPortfolioSource::new("https://api.example/v1/", "k", Duration::from_secs(1))
                .unwrap();
        assert_eq!(source.base_url, "https://api.example/v1");
    }
}
