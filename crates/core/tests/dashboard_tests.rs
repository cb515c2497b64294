// ═══════════════════════════════════════════════════════════════════
// Dashboard Tests — WalletDashboard queries, caching, pipelines
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wallet_dashboard_core::errors::CoreError;
use wallet_dashboard_core::models::category::{CategoryRef, CategorySet};
use wallet_dashboard_core::models::fetch::{Disposition, RequestKey};
use wallet_dashboard_core::models::interval::{DateRange, Interval};
use wallet_dashboard_core::models::portfolio::{
    Asset, AssetSlot, ChainHolding, Portfolio, Position, ProtocolHolding,
};
use wallet_dashboard_core::models::query::{HistoricalQuery, PortfolioQuery, TransactionQuery};
use wallet_dashboard_core::models::settings::{BucketingParams, Settings};
use wallet_dashboard_core::models::transaction::{AssetMovement, Transaction};
use wallet_dashboard_core::providers::traits::{PortfolioSource, MAX_TRANSACTION_PAGES};
use wallet_dashboard_core::services::interval_service::CategoryFlowSpec;
use wallet_dashboard_core::services::value_aggregator::KeyMode;
use wallet_dashboard_core::storage::backend::MemoryBackend;
use wallet_dashboard_core::WalletDashboard;

// ═══════════════════════════════════════════════════════════════════
// Test Helpers — Mock Source
// ═══════════════════════════════════════════════════════════════════

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// A single-position portfolio holding the given (symbol, value) pairs.
fn portfolio(address: &str, holdings: &[(&str, &str)]) -> Portfolio {
    let assets = holdings.iter().map(|(s, v)| Asset::new(*s, "", *v)).collect();
    let position = Position::new("WALLET").with_assets(AssetSlot::Assets, assets);

    let mut chain = ChainHolding {
        key: "ethereum".into(),
        ..ChainHolding::default()
    };
    chain.positions.insert("WALLET".into(), position);

    let mut protocol = ProtocolHolding {
        key: "wallet".into(),
        ..ProtocolHolding::default()
    };
    protocol.chains.insert("ethereum".into(), chain);

    let mut p = Portfolio {
        address: address.into(),
        net_worth: "0".into(),
        ..Portfolio::default()
    };
    p.protocols.insert("wallet".into(), protocol);
    p
}

/// Serves canned portfolios, fails the configured addresses, and counts calls.
#[derive(Default)]
struct MockSource {
    failing: Mutex<HashSet<String>>,
    transactions: Vec<Transaction>,
    portfolio_calls: AtomicUsize,
    page_calls: AtomicUsize,
}

impl MockSource {
    fn failing(addresses: &[&str]) -> Self {
        let source = Self::default();
        source.set_failing(addresses);
        source
    }

    fn set_failing(&self, addresses: &[&str]) {
        *self.failing.lock().unwrap() = addresses.iter().map(|a| a.to_string()).collect();
    }

    fn check(&self, address: &str) -> Result<(), CoreError> {
        if self.failing.lock().unwrap().contains(address) {
            return Err(CoreError::Network(format!("connection reset for {address}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PortfolioSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_portfolio(&self, address: &str) -> Result<Portfolio, CoreError> {
        self.portfolio_calls.fetch_add(1, Ordering::SeqCst);
        self.check(address)?;
        Ok(portfolio(address, &[("ETH", "100"), ("USDC", "50"), ("DUST", "1")]))
    }

    async fn fetch_historical_portfolio(
        &self,
        address: &str,
        date: NaiveDate,
    ) -> Result<Portfolio, CoreError> {
        self.check(address)?;
        // ETH grows by 10 per month of the year
        let eth = format!("{}", 100 + 10 * chrono::Datelike::month(&date));
        Ok(portfolio(address, &[("ETH", eth.as_str())]))
    }

    async fn fetch_transactions_page(
        &self,
        address: &str,
        _range: &DateRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.check(address)?;
        Ok(self.transactions.iter().skip(offset).take(limit).cloned().collect())
    }
}

fn settings() -> Settings {
    Settings {
        api_key: "test".into(),
        transactions_page_size: 2,
        bucketing: BucketingParams::new(0.05, 0.01, 5),
        ..Settings::default()
    }
}

fn dashboard(source: Arc<MockSource>) -> WalletDashboard {
    WalletDashboard::new(settings(), source, Arc::new(MemoryBackend::new()))
}

fn tx(hash: &str, timestamp: &str, category: &str, value_in: &str) -> Transaction {
    let mut tx = Transaction::new(hash, timestamp);
    tx.categories = CategorySet::new(vec![CategoryRef::label(category)]);
    tx.assets_in = vec![AssetMovement::new("ETH", value_in)];
    tx
}

// ── Current portfolios ──────────────────────────────────────────────

mod portfolios {
    use super::*;

    #[tokio::test]
    async fn partial_failure_keeps_successful_addresses() {
        let source = Arc::new(MockSource::failing(&["0xbad"]));
        let dash = dashboard(source);

        let result = dash
            .portfolios(&PortfolioQuery::new(["0xA", "0xbad", "0xc"]))
            .await
            .unwrap();

        assert_eq!(result.disposition(), Disposition::PartialSuccess);
        assert_eq!(result.combined.len(), 2);
        assert_eq!(result.failed_keys(), vec![&RequestKey::address("0xbad")]);

        // Two addresses: ETH 200, USDC 100, DUST 2 (small, folded)
        let allocation = dash.asset_allocation(&result, KeyMode::Symbol);
        assert_eq!(allocation.labels(), vec!["ETH", "USDC", "Other"]);
        assert_eq!(allocation.total, 302.0);
    }

    #[tokio::test]
    async fn total_success_is_served_from_cache() {
        let source = Arc::new(MockSource::default());
        let dash = dashboard(source.clone());
        let query = PortfolioQuery::new(["0xa", "0xb"]);

        let first = dash.portfolios(&query).await.unwrap();
        assert!(!first.from_cache);
        let second = dash.portfolios(&query).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.combined, first.combined);
        assert_eq!(source.portfolio_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn equivalent_address_lists_share_an_entry() {
        let source = Arc::new(MockSource::default());
        let dash = dashboard(source.clone());

        dash.portfolios(&PortfolioQuery::new(["0xB", "0xa"])).await.unwrap();
        let again = dash.portfolios(&PortfolioQuery::new([" 0xa", "0xb", "0xb"])).await.unwrap();
        assert!(again.from_cache);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_the_cache() {
        let source = Arc::new(MockSource::default());
        let dash = dashboard(source.clone());
        let query = PortfolioQuery::new(["0xa"]);

        dash.portfolios(&query).await.unwrap();
        let refreshed = dash.portfolios(&query.clone().refresh()).await.unwrap();
        assert!(!refreshed.from_cache);
        assert_eq!(source.portfolio_calls.load(Ordering::SeqCst), 2);

        // The refreshed result was written back under the same identity
        assert!(dash.portfolios(&query).await.unwrap().from_cache);
    }

    #[tokio::test]
    async fn partial_results_are_not_cached() {
        let source = Arc::new(MockSource::failing(&["0xb"]));
        let dash = dashboard(source.clone());
        let query = PortfolioQuery::new(["0xa", "0xb"]);

        let first = dash.portfolios(&query).await.unwrap();
        assert_eq!(first.disposition(), Disposition::PartialSuccess);

        source.set_failing(&[]);
        let second = dash.portfolios(&query).await.unwrap();
        assert!(!second.from_cache);
        assert!(second.is_total_success());
    }

    #[tokio::test]
    async fn total_failure_is_a_value_not_an_error() {
        let source = Arc::new(MockSource::failing(&["0xa"]));
        let dash = dashboard(source);
        let result = dash.portfolios(&PortfolioQuery::new(["0xa"])).await.unwrap();
        assert_eq!(result.disposition(), Disposition::TotalFailure);
        assert!(dash.asset_allocation(&result, KeyMode::Symbol).is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let dash = dashboard(Arc::new(MockSource::default()));
        let err = dash.portfolios(&PortfolioQuery::new(["  "])).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn protocol_and_chain_allocations() {
        let dash = dashboard(Arc::new(MockSource::default()));
        let result = dash.portfolios(&PortfolioQuery::new(["0xa"])).await.unwrap();
        assert_eq!(dash.protocol_allocation(&result).labels(), vec!["wallet"]);
        assert_eq!(dash.chain_allocation(&result).labels(), vec!["ethereum"]);
    }
}

// ── Historical snapshots ────────────────────────────────────────────

mod historical {
    use super::*;

    #[tokio::test]
    async fn comparison_and_net_worth_align_with_dates() {
        let dash = dashboard(Arc::new(MockSource::default()));
        let dates = vec![d(2024, 1, 31), d(2024, 2, 29), d(2024, 3, 31)];
        let query = HistoricalQuery::new(["0xa", "0xb"], dates.clone());

        let result = dash.historical_portfolios(&query).await.unwrap();
        assert_eq!(result.combined.len(), 6);

        let comparison = dash.asset_comparison(&result, &dates, KeyMode::Symbol);
        assert_eq!(comparison.labels(), vec!["ETH"]);
        assert_eq!(comparison.entries[0].values, vec![220.0, 240.0, 260.0]);

        let net_worth = dash.net_worth_series(&result, &dates);
        assert_eq!(net_worth, vec![(dates[0], 220.0), (dates[1], 240.0), (dates[2], 260.0)]);
    }

    #[tokio::test]
    async fn failed_address_leaves_other_dates_intact() {
        let dash = dashboard(Arc::new(MockSource::failing(&["0xb"])));
        let dates = vec![d(2024, 1, 31)];
        let result = dash
            .historical_portfolios(&HistoricalQuery::new(["0xa", "0xb"], dates.clone()))
            .await
            .unwrap();

        assert_eq!(result.disposition(), Disposition::PartialSuccess);
        assert_eq!(result.failed_keys(), vec![&RequestKey::dated("0xb", dates[0])]);
        assert_eq!(dash.net_worth_series(&result, &dates), vec![(dates[0], 110.0)]);
    }
}

// ── Transactions ────────────────────────────────────────────────────

mod transactions {
    use super::*;

    fn source_with_history() -> MockSource {
        MockSource {
            transactions: vec![
                tx("1", "2024-01-03T00:00:00Z", "swap", "10"),
                tx("2", "2024-01-20T00:00:00Z", "swap", "5"),
                tx("3", "2024-02-14T00:00:00Z", "income", "100"),
            ],
            ..MockSource::default()
        }
    }

    #[tokio::test]
    async fn pages_until_short_page() {
        let source = Arc::new(source_with_history());
        let dash = dashboard(source.clone());
        let range = DateRange::new(d(2024, 1, 1), d(2024, 3, 31)).unwrap();

        let result = dash.transactions(&TransactionQuery::new(["0xa"], range)).await.unwrap();
        assert_eq!(result.combined[&RequestKey::address("0xa")].len(), 3);
        // Page size 2: a full page, then a short one
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn flows_and_stacks_cover_every_interval() {
        let dash = dashboard(Arc::new(source_with_history()));
        let range = DateRange::new(d(2024, 1, 1), d(2024, 3, 31)).unwrap();
        let result = dash.transactions(&TransactionQuery::new(["0xa"], range)).await.unwrap();

        let spec = CategoryFlowSpec::new(range, Interval::Month);
        let table = dash.category_flows(&result, &spec);
        assert_eq!(table.get(d(2024, 1, 1), "swap"), Some(15.0));
        assert_eq!(table.get(d(2024, 2, 1), "income"), Some(100.0));

        let (starts, stacks) = dash.category_stacks(&table, &spec);
        assert_eq!(starts.len(), 3);
        assert!(stacks.entries.iter().all(|e| e.values.len() == 3));
        assert_eq!(stacks.magnitudes, vec![15.0, 100.0, 0.0]);
    }
}

// ── Transaction paging ──────────────────────────────────────────────

mod paging {
    use super::*;
    use std::time::Duration;

    /// Serves pages of `limit` transactions after `delay` each. The page at
    /// index `full_pages` is short; `None` keeps every page full.
    struct PagedSource {
        delay: Duration,
        full_pages: Option<usize>,
        page_calls: AtomicUsize,
    }

    impl PagedSource {
        fn new(delay: Duration, full_pages: Option<usize>) -> Self {
            Self {
                delay,
                full_pages,
                page_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PortfolioSource for PagedSource {
        fn name(&self) -> &str {
            "paged"
        }

        async fn fetch_portfolio(&self, address: &str) -> Result<Portfolio, CoreError> {
            Err(CoreError::Network(format!("no snapshot for {address}")))
        }

        async fn fetch_historical_portfolio(
            &self,
            address: &str,
            _date: NaiveDate,
        ) -> Result<Portfolio, CoreError> {
            Err(CoreError::Network(format!("no snapshot for {address}")))
        }

        async fn fetch_transactions_page(
            &self,
            _address: &str,
            _range: &DateRange,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<Transaction>, CoreError> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let len = match self.full_pages {
                Some(full) if offset / limit >= full => 1,
                _ => limit,
            };
            Ok((offset..offset + len)
                .map(|i| tx(&i.to_string(), "2024-01-10T00:00:00Z", "swap", "1"))
                .collect())
        }
    }

    fn q1() -> DateRange {
        DateRange::new(d(2024, 1, 1), d(2024, 3, 31)).unwrap()
    }

    #[tokio::test]
    async fn slow_history_completes_when_each_page_fits() {
        let source = PagedSource::new(Duration::from_millis(100), Some(5));
        let all = source
            .fetch_all_transactions("0xa", &q1(), 2, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(all.len(), 11);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn stalled_page_times_out_with_its_index() {
        let source = PagedSource::new(Duration::from_millis(200), Some(5));
        let err = source
            .fetch_all_transactions("0xa", &q1(), 2, Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            CoreError::Timeout { key, millis } => {
                assert_eq!(key, "0xa page 0");
                assert_eq!(millis, 50);
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn request_timeout_bounds_pages_not_the_whole_walk() {
        // Six pages at 300ms each run well past the 1s request timeout
        let source = Arc::new(PagedSource::new(Duration::from_millis(300), Some(5)));
        let settings = Settings {
            request_timeout_secs: 1,
            fanout_timeout_secs: 10,
            ..settings()
        };
        let dash = WalletDashboard::new(settings, source, Arc::new(MemoryBackend::new()));

        let result = dash.transactions(&TransactionQuery::new(["0xa"], q1())).await.unwrap();
        assert_eq!(result.disposition(), Disposition::TotalSuccess);
        assert_eq!(result.combined[&RequestKey::address("0xa")].len(), 11);
    }

    #[tokio::test]
    async fn endless_paging_fails_the_key_and_is_not_cached() {
        let source = Arc::new(PagedSource::new(Duration::ZERO, None));
        let settings = Settings {
            transactions_page_size: 1,
            ..settings()
        };
        let dash = WalletDashboard::new(settings, source.clone(), Arc::new(MemoryBackend::new()));
        let query = TransactionQuery::new(["0xa"], q1());

        let first = dash.transactions(&query).await.unwrap();
        assert_eq!(first.disposition(), Disposition::TotalFailure);
        assert!(first.errors[0].reason.contains("exceed"), "{}", first.errors[0].reason);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), MAX_TRANSACTION_PAGES);

        let second = dash.transactions(&query).await.unwrap();
        assert!(!second.from_cache);
    }
}

// ── Cache management ────────────────────────────────────────────────

mod cache_management {
    use super::*;

    #[tokio::test]
    async fn clear_forces_refetch() {
        let source = Arc::new(MockSource::default());
        let dash = dashboard(source.clone());
        let query = PortfolioQuery::new(["0xa"]);

        dash.portfolios(&query).await.unwrap();
        assert_eq!(dash.clear_cache().unwrap(), 1);
        assert!(!dash.portfolios(&query).await.unwrap().from_cache);
        assert_eq!(dash.sweep_cache().unwrap(), 0);
    }
}
