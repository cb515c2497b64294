use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::category::CategorySet;
use crate::models::dataset::ComparisonSeries;
use crate::models::interval::{
    CategoryFilter, DateRange, Interval, IntervalCategoryTable, ValueMode,
};
use crate::models::transaction::{AssetMovement, Transaction};

/// Parameters of one interval/category aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFlowSpec {
    pub range: DateRange,
    pub interval: Interval,
    /// First day of a week bucket
    pub week_start: Weekday,
    pub filter: CategoryFilter,
    pub mode: ValueMode,
}

impl CategoryFlowSpec {
    pub fn new(range: DateRange, interval: Interval) -> Self {
        Self {
            range,
            interval,
            week_start: Weekday::Mon,
            filter: CategoryFilter::All,
            mode: ValueMode::Gross,
        }
    }

    pub fn with_filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_mode(mut self, mode: ValueMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }
}

/// Buckets transactions into calendar intervals cross-tabulated by category.
///
/// A transaction contributes through every structural path that carries a
/// category, additively:
/// - transaction-level categories receive the transaction's value once per
///   distinct label (net in − out in gross mode, total fees in fee mode);
/// - each categorised movement adds its own value under its own labels
///   (gross: inbound `+`, outbound and fees `−`; fee mode: fee movements `+`).
pub struct IntervalService;

impl IntervalService {
    pub fn aggregate<'a, I>(transactions: I, spec: &CategoryFlowSpec) -> IntervalCategoryTable
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut table = IntervalCategoryTable::new();

        for tx in transactions {
            let Some(timestamp) = tx.timestamp_utc() else {
                tracing::debug!(
                    hash = %tx.hash,
                    timestamp = %tx.timestamp,
                    "Skipping transaction with unparsable timestamp"
                );
                continue;
            };
            let date = timestamp.date_naive();
            if !spec.range.contains(date) {
                continue;
            }
            let bucket = spec.interval.truncate(date, spec.week_start);

            if !tx.categories.is_empty() {
                let value = match spec.mode {
                    ValueMode::Gross => tx.net_value(),
                    ValueMode::Fees => tx.fee_total(),
                };
                for key in resolve_keys(&tx.categories, &tx.hash) {
                    if spec.filter.keeps(&key) {
                        table.add(bucket, &key, value);
                    }
                }
            }

            let movements: Vec<(&[AssetMovement], f64)> = match spec.mode {
                ValueMode::Gross => vec![
                    (tx.assets_in.as_slice(), 1.0),
                    (tx.assets_out.as_slice(), -1.0),
                    (tx.native_asset_fees.as_slice(), -1.0),
                ],
                ValueMode::Fees => vec![(tx.native_asset_fees.as_slice(), 1.0)],
            };
            for (group, sign) in movements {
                for movement in group.iter().filter(|m| !m.categories.is_empty()) {
                    let value = sign * movement.numeric_value();
                    for key in resolve_keys(&movement.categories, &tx.hash) {
                        if spec.filter.keeps(&key) {
                            table.add(bucket, &key, value);
                        }
                    }
                }
            }
        }

        table
    }

    /// Start of every interval overlapping `range`, in order. The first start
    /// may precede `range.start` because it is truncated to the boundary.
    pub fn interval_starts(
        range: &DateRange,
        interval: Interval,
        week_start: Weekday,
    ) -> Vec<NaiveDate> {
        let mut starts = Vec::new();
        let mut current = Some(interval.truncate(range.start, week_start));
        while let Some(start) = current.filter(|s| *s <= range.end) {
            starts.push(start);
            current = interval.next(start);
        }
        starts
    }

    /// Dense category → per-interval values, zero-filled, one slot per entry
    /// of `starts`. Intervals in the table but not in `starts` are ignored.
    pub fn to_series(table: &IntervalCategoryTable, starts: &[NaiveDate]) -> ComparisonSeries {
        let rows = table.categories().into_iter().map(|category| {
            let values = starts
                .iter()
                .map(|start| table.get(*start, category).unwrap_or(0.0))
                .collect();
            (category.to_string(), values)
        });
        ComparisonSeries::from_rows(starts.len(), rows)
    }
}

/// Distinct category keys at one level. Records without a label are dropped.
fn resolve_keys(categories: &CategorySet, hash: &str) -> BTreeSet<String> {
    categories
        .iter()
        .filter_map(|category| {
            let key = category.key();
            if key.is_none() {
                tracing::warn!(hash, ?category, "Dropping category without a label");
            }
            key.map(str::to_string)
        })
        .collect()
}
