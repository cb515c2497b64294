use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::CoreError;

/// Calendar granularity for interval aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Interval {
    /// Truncate `date` to the start of its interval. Weeks start on `week_start`.
    pub fn truncate(&self, date: NaiveDate, week_start: Weekday) -> NaiveDate {
        match self {
            Interval::Day => date,
            Interval::Week => {
                let offset = (7 + date.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7;
                date.checked_sub_days(Days::new(offset as u64)).unwrap_or(date)
            }
            Interval::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
            }
            Interval::Quarter => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
            }
            Interval::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Start of the interval following the one starting at `start`.
    pub fn next(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Interval::Day => start.succ_opt(),
            Interval::Week => start.checked_add_days(Days::new(7)),
            Interval::Month => start.checked_add_months(Months::new(1)),
            Interval::Quarter => start.checked_add_months(Months::new(3)),
            Interval::Year => start.checked_add_months(Months::new(12)),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interval::Day => write!(f, "day"),
            Interval::Week => write!(f, "week"),
            Interval::Month => write!(f, "month"),
            Interval::Quarter => write!(f, "quarter"),
            Interval::Year => write!(f, "year"),
        }
    }
}

impl std::str::FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Ok(Interval::Day),
            "week" | "weekly" => Ok(Interval::Week),
            "month" | "monthly" => Ok(Interval::Month),
            "quarter" | "quarterly" => Ok(Interval::Quarter),
            "year" | "yearly" => Ok(Interval::Year),
            other => Err(CoreError::ValidationError(format!("Unknown interval: {other}"))),
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::ValidationError(format!(
                "'start' date ({start}) must not be after 'end' date ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Which category keys an aggregation keeps.
///
/// `Only` with an empty set keeps nothing; use `All` to keep everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl CategoryFilter {
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoryFilter::Only(keys.into_iter().map(Into::into).collect())
    }

    pub fn keeps(&self, key: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(keys) => keys.contains(key),
        }
    }
}

/// Which value a transaction contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMode {
    /// Movement values: inbound positive, outbound and fees negative
    #[default]
    Gross,
    /// Native fee values only
    Fees,
}

/// Interval start → category key → signed total.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntervalCategoryTable {
    pub rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl IntervalCategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, interval_start: NaiveDate, category: &str) -> Option<f64> {
        self.rows.get(&interval_start)?.get(category).copied()
    }

    pub fn intervals(&self) -> impl Iterator<Item = &NaiveDate> {
        self.rows.keys()
    }

    /// Every category that appears in any interval, sorted.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.rows
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    /// Sum of one category across every interval.
    pub fn category_total(&self, category: &str) -> f64 {
        self.rows.values().filter_map(|row| row.get(category)).sum()
    }

    pub(crate) fn add(&mut self, interval_start: NaiveDate, category: &str, value: f64) {
        *self
            .rows
            .entry(interval_start)
            .or_default()
            .entry(category.to_string())
            .or_insert(0.0) += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_truncation_respects_week_start() {
        // 2024-03-07 is a Thursday
        let date = d(2024, 3, 7);
        assert_eq!(Interval::Week.truncate(date, Weekday::Mon), d(2024, 3, 4));
        assert_eq!(Interval::Week.truncate(date, Weekday::Sun), d(2024, 3, 3));
        assert_eq!(Interval::Week.truncate(d(2024, 3, 4), Weekday::Mon), d(2024, 3, 4));
    }

    #[test]
    fn month_quarter_year_truncation() {
        let date = d(2024, 8, 19);
        assert_eq!(Interval::Month.truncate(date, Weekday::Mon), d(2024, 8, 1));
        assert_eq!(Interval::Quarter.truncate(date, Weekday::Mon), d(2024, 7, 1));
        assert_eq!(Interval::Year.truncate(date, Weekday::Mon), d(2024, 1, 1));
        assert_eq!(Interval::Quarter.truncate(d(2024, 3, 31), Weekday::Mon), d(2024, 1, 1));
    }

    #[test]
    fn next_interval() {
        assert_eq!(Interval::Month.next(d(2024, 1, 1)), Some(d(2024, 2, 1)));
        assert_eq!(Interval::Quarter.next(d(2024, 10, 1)), Some(d(2025, 1, 1)));
        assert_eq!(Interval::Week.next(d(2024, 12, 30)), Some(d(2025, 1, 6)));
    }

    #[test]
    fn parse_interval() {
        assert_eq!("Weekly".parse::<Interval>().unwrap(), Interval::Week);
        assert!("fortnight".parse::<Interval>().is_err());
    }

    #[test]
    fn empty_only_filter_keeps_nothing() {
        let none = CategoryFilter::Only(BTreeSet::new());
        assert!(!none.keeps("swap"));
        assert!(CategoryFilter::All.keeps("swap"));
        assert!(CategoryFilter::only(["swap"]).keeps("swap"));
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert!(range.contains(d(2024, 1, 31)));
        assert!(!range.contains(d(2024, 2, 1)));
    }
}
