use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::interval::DateRange;
use crate::models::portfolio::Portfolio;
use crate::models::transaction::Transaction;

/// Hard stop for pagination against a source that never returns a short page.
pub const MAX_TRANSACTION_PAGES: usize = 1_000;

/// Upstream portfolio/transaction data source.
///
/// The fan-out layer calls exactly one method per request key; everything
/// else (retries, caching, combination) happens above this trait. Swapping
/// the upstream API means writing one new implementation.
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Current holdings of one wallet.
    async fn fetch_portfolio(&self, address: &str) -> Result<Portfolio, CoreError>;

    /// Holdings of one wallet as of `date`.
    async fn fetch_historical_portfolio(
        &self,
        address: &str,
        date: NaiveDate,
    ) -> Result<Portfolio, CoreError>;

    /// One page of a wallet's transactions within `range`.
    async fn fetch_transactions_page(
        &self,
        address: &str,
        range: &DateRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError>;

    /// Every transaction in `range`, paging until a short page comes back.
    ///
    /// `page_timeout` bounds each page request on its own, so a long but
    /// healthy history is never cut off by a single overall deadline. A
    /// source that keeps returning full pages past [`MAX_TRANSACTION_PAGES`]
    /// is an error: a truncated history must not pass as complete.
    async fn fetch_all_transactions(
        &self,
        address: &str,
        range: &DateRange,
        page_size: usize,
        page_timeout: Duration,
    ) -> Result<Vec<Transaction>, CoreError> {
        let limit = page_size.max(1);
        let mut all = Vec::new();

        for page in 0..MAX_TRANSACTION_PAGES {
            let request = self.fetch_transactions_page(address, range, page * limit, limit);
            let batch = tokio::time::timeout(page_timeout, request)
                .await
                .map_err(|_| CoreError::Timeout {
                    key: format!("{address} page {page}"),
                    millis: page_timeout.as_millis() as u64,
                })??;
            let short = batch.len() < limit;
            all.extend(batch);
            if short {
                return Ok(all);
            }
        }

        tracing::warn!(
            source = self.name(),
            address,
            pages = MAX_TRANSACTION_PAGES,
            "Transaction paging hit the page limit"
        );
        Err(CoreError::Api {
            provider: self.name().to_string(),
            message: format!(
                "transactions for {address} exceed {MAX_TRANSACTION_PAGES} pages of {limit}"
            ),
        })
    }
}
