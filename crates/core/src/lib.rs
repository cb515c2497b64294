pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use errors::CoreError;
use models::{
    dataset::{BucketedDataset, BucketedSeries, StackedDataset},
    fetch::{FanOutResult, RequestKey},
    interval::IntervalCategoryTable,
    portfolio::Portfolio,
    query::{HistoricalQuery, PortfolioQuery, TransactionQuery},
    settings::Settings,
    transaction::Transaction,
};
use providers::{http::HttpPortfolioSource, traits::PortfolioSource};
use services::{
    dashboard_service::DashboardService, fanout_service::FanOutCombiner,
    interval_service::CategoryFlowSpec, value_aggregator::KeyMode,
};
use storage::{
    backend::{CacheBackend, FileBackend},
    cache_key::QueryIdentity,
    ttl_cache::TtlCache,
};

/// Main entry point for the wallet dashboard core library.
/// Wires the upstream source, the fan-out combiner and the TTL cache, and
/// exposes the aggregation pipelines over their results.
#[must_use]
pub struct WalletDashboard {
    settings: Settings,
    source: Arc<dyn PortfolioSource>,
    /// Bounds each single-call key by the request timeout
    combiner: FanOutCombiner,
    /// Bounds each paginated key by the fan-out timeout
    paging_combiner: FanOutCombiner,
    cache: TtlCache,
}

impl std::fmt::Debug for WalletDashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletDashboard")
            .field("source", &self.source.name())
            .field("timeout", &self.combiner.timeout())
            .field("paging_timeout", &self.paging_combiner.timeout())
            .field("settings", &self.settings)
            .finish()
    }
}

impl WalletDashboard {
    /// Assemble from explicit parts (tests, embedding).
    pub fn new(
        settings: Settings,
        source: Arc<dyn PortfolioSource>,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let combiner = FanOutCombiner::new(settings.request_timeout());
        let paging_combiner = FanOutCombiner::new(settings.fanout_timeout());
        Self {
            settings,
            source,
            combiner,
            paging_combiner,
            cache: TtlCache::new(backend),
        }
    }

    /// HTTP source plus file cache, both configured from `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self, CoreError> {
        settings.validate()?;
        let source = HttpPortfolioSource::from_settings(&settings)?;
        let backend = FileBackend::new(settings.cache_dir.clone());
        Ok(Self::new(settings, Arc::new(source), Arc::new(backend)))
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Current snapshot of every address in the query.
    pub async fn portfolios(
        &self,
        query: &PortfolioQuery,
    ) -> Result<FanOutResult<Portfolio>, CoreError> {
        let identity = query.identity()?;
        let keys = query.keys()?;
        let ttl = self.settings.portfolio_ttl();
        let source = Arc::clone(&self.source);
        Ok(self
            .cached_fan_out(&self.combiner, identity, keys, ttl, query.force_refresh, |key| {
                let source = Arc::clone(&source);
                async move { source.fetch_portfolio(&key.address).await }
            })
            .await)
    }

    /// Snapshot of every address at every date in the query.
    pub async fn historical_portfolios(
        &self,
        query: &HistoricalQuery,
    ) -> Result<FanOutResult<Portfolio>, CoreError> {
        let identity = query.identity()?;
        let keys = query.keys()?;
        let ttl = self.settings.historical_ttl();
        let source = Arc::clone(&self.source);
        Ok(self
            .cached_fan_out(&self.combiner, identity, keys, ttl, query.force_refresh, |key| {
                let source = Arc::clone(&source);
                async move {
                    let date = key.date.ok_or_else(|| {
                        CoreError::ValidationError(format!("historical key {key} has no date"))
                    })?;
                    source.fetch_historical_portfolio(&key.address, date).await
                }
            })
            .await)
    }

    /// All transactions of every address within the query's range.
    ///
    /// Each page is bounded by the request timeout; a wallet's whole walk is
    /// bounded by the longer fan-out timeout.
    pub async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<FanOutResult<Vec<Transaction>>, CoreError> {
        let identity = query.identity()?;
        let keys = query.keys()?;
        let range = query.range;
        let page_size = self.settings.transactions_page_size;
        let page_timeout = self.settings.request_timeout();
        let ttl = self.settings.transactions_ttl();
        let source = Arc::clone(&self.source);
        Ok(self
            .cached_fan_out(&self.paging_combiner, identity, keys, ttl, query.force_refresh, |key| {
                let source = Arc::clone(&source);
                async move {
                    source
                        .fetch_all_transactions(&key.address, &range, page_size, page_timeout)
                        .await
                }
            })
            .await)
    }

    /// Serve from cache when fresh, otherwise fan out. Only a total success
    /// is written back, so failed keys are retried on the next query.
    async fn cached_fan_out<T, F, Fut>(
        &self,
        combiner: &FanOutCombiner,
        identity: QueryIdentity,
        keys: Vec<RequestKey>,
        ttl: Duration,
        force_refresh: bool,
        fetch: F,
    ) -> FanOutResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(RequestKey) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        if !force_refresh {
            if let Some(mut cached) = self.cache.get::<FanOutResult<T>>(&identity) {
                cached.from_cache = true;
                return cached;
            }
        }

        let result = combiner.combine(keys, fetch).await;
        if result.is_total_success() {
            if let Err(e) = self.cache.set(&identity, &result, ttl) {
                tracing::warn!(
                    key = %identity.canonical(),
                    error = %e,
                    "Failed to cache fan-out result"
                );
            }
        } else {
            tracing::debug!(key = %identity.canonical(), "Incomplete result not cached");
        }
        result
    }

    // ── Pipelines ───────────────────────────────────────────────────

    #[must_use]
    pub fn asset_allocation(
        &self,
        portfolios: &FanOutResult<Portfolio>,
        mode: KeyMode,
    ) -> BucketedDataset {
        DashboardService::asset_allocation(portfolios, mode, &self.settings.bucketing)
    }

    #[must_use]
    pub fn protocol_allocation(&self, portfolios: &FanOutResult<Portfolio>) -> BucketedDataset {
        DashboardService::protocol_allocation(portfolios, &self.settings.bucketing)
    }

    #[must_use]
    pub fn chain_allocation(&self, portfolios: &FanOutResult<Portfolio>) -> BucketedDataset {
        DashboardService::chain_allocation(portfolios, &self.settings.bucketing)
    }

    #[must_use]
    pub fn asset_comparison(
        &self,
        historical: &FanOutResult<Portfolio>,
        dates: &[NaiveDate],
        mode: KeyMode,
    ) -> BucketedSeries {
        DashboardService::asset_comparison(historical, dates, mode, &self.settings.bucketing)
    }

    #[must_use]
    pub fn net_worth_series(
        &self,
        historical: &FanOutResult<Portfolio>,
        dates: &[NaiveDate],
    ) -> Vec<(NaiveDate, f64)> {
        DashboardService::net_worth_series(historical, dates)
    }

    #[must_use]
    pub fn category_flows(
        &self,
        transactions: &FanOutResult<Vec<Transaction>>,
        spec: &CategoryFlowSpec,
    ) -> IntervalCategoryTable {
        DashboardService::category_flows(transactions, spec)
    }

    #[must_use]
    pub fn category_stacks(
        &self,
        table: &IntervalCategoryTable,
        spec: &CategoryFlowSpec,
    ) -> (Vec<NaiveDate>, StackedDataset) {
        DashboardService::category_stacks(table, spec, &self.settings.bucketing)
    }

    // ── Cache Management ────────────────────────────────────────────

    /// Delete expired and unreadable cache entries.
    pub fn sweep_cache(&self) -> Result<usize, CoreError> {
        self.cache.sweep()
    }

    pub fn clear_cache(&self) -> Result<usize, CoreError> {
        self.cache.clear()
    }
}
