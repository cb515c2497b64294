use chrono::NaiveDate;

use crate::models::dataset::{BucketedDataset, BucketedSeries, StackedDataset, ValueDictionary};
use crate::models::fetch::FanOutResult;
use crate::models::interval::IntervalCategoryTable;
use crate::models::portfolio::Portfolio;
use crate::models::settings::BucketingParams;
use crate::models::transaction::Transaction;
use crate::services::bucketing_service::BucketingService;
use crate::services::comparison_service::ComparisonService;
use crate::services::interval_service::{CategoryFlowSpec, IntervalService};
use crate::services::value_aggregator::{KeyMode, ValueAggregator};

/// Composes the aggregation stages into the datasets the dashboard widgets
/// consume. Works on whatever a fan-out managed to fetch: keys that failed
/// are simply absent from the input.
pub struct DashboardService;

impl DashboardService {
    /// Asset allocation across every fetched address.
    pub fn asset_allocation(
        portfolios: &FanOutResult<Portfolio>,
        mode: KeyMode,
        params: &BucketingParams,
    ) -> BucketedDataset {
        let dict = ValueAggregator::aggregate_portfolios(portfolios.values(), mode);
        BucketingService::bucket(&dict, params)
    }

    /// Protocol allocation across every fetched address.
    pub fn protocol_allocation(
        portfolios: &FanOutResult<Portfolio>,
        params: &BucketingParams,
    ) -> BucketedDataset {
        let dict = portfolios
            .values()
            .map(ValueAggregator::aggregate_protocols)
            .fold(ValueDictionary::new(), |acc, d| acc.merged(&d));
        BucketingService::bucket(&dict, params)
    }

    /// Chain allocation across every fetched address.
    pub fn chain_allocation(
        portfolios: &FanOutResult<Portfolio>,
        params: &BucketingParams,
    ) -> BucketedDataset {
        let dict = portfolios
            .values()
            .map(ValueAggregator::aggregate_chains)
            .fold(ValueDictionary::new(), |acc, d| acc.merged(&d));
        BucketingService::bucket(&dict, params)
    }

    /// One dictionary per date, each summed across the addresses fetched for
    /// that date. Dates with no successful fetch yield an empty dictionary so
    /// alignment with `dates` is preserved.
    pub fn snapshot_dictionaries(
        historical: &FanOutResult<Portfolio>,
        dates: &[NaiveDate],
        mode: KeyMode,
    ) -> Vec<ValueDictionary> {
        dates
            .iter()
            .map(|date| ValueAggregator::aggregate_portfolios(historical.for_date(*date), mode))
            .collect()
    }

    /// Per-asset values over `dates`, bucketed into a bounded series.
    pub fn asset_comparison(
        historical: &FanOutResult<Portfolio>,
        dates: &[NaiveDate],
        mode: KeyMode,
        params: &BucketingParams,
    ) -> BucketedSeries {
        let snapshots = Self::snapshot_dictionaries(historical, dates, mode);
        let series = ComparisonService::build(&snapshots);
        BucketingService::bucket_series(&series, params)
    }

    /// Net worth per date from leaf assets, summed across addresses.
    pub fn net_worth_series(
        historical: &FanOutResult<Portfolio>,
        dates: &[NaiveDate],
    ) -> Vec<(NaiveDate, f64)> {
        dates
            .iter()
            .map(|date| {
                let total = historical.for_date(*date).map(ValueAggregator::net_worth).sum();
                (*date, total)
            })
            .collect()
    }

    /// Interval × category table over every fetched address's transactions.
    pub fn category_flows(
        transactions: &FanOutResult<Vec<Transaction>>,
        spec: &CategoryFlowSpec,
    ) -> IntervalCategoryTable {
        IntervalService::aggregate(transactions.values().flatten(), spec)
    }

    /// Dense, sign-aware stacked dataset: one stack per interval in the range.
    pub fn category_stacks(
        table: &IntervalCategoryTable,
        spec: &CategoryFlowSpec,
        params: &BucketingParams,
    ) -> (Vec<NaiveDate>, StackedDataset) {
        let starts = IntervalService::interval_starts(&spec.range, spec.interval, spec.week_start);
        let series = IntervalService::to_series(table, &starts);
        (starts, BucketingService::bucket_diverging(&series, params))
    }
}
