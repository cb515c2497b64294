use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key → numeric value, derived from one snapshot.
///
/// Backed by a `BTreeMap` so iteration (and serialization) is canonical:
/// two dictionaries built from the same data compare and print identically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueDictionary(BTreeMap<String, f64>);

impl ValueDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Sum two dictionaries key-wise into a new one.
    pub fn merged(&self, other: &ValueDictionary) -> ValueDictionary {
        let mut out = self.0.clone();
        for (key, value) in &other.0 {
            *out.entry(key.clone()).or_insert(0.0) += value;
        }
        ValueDictionary(out)
    }

    pub(crate) fn add(&mut self, key: &str, value: f64) {
        *self.0.entry(key.to_string()).or_insert(0.0) += value;
    }
}

impl FromIterator<(String, f64)> for ValueDictionary {
    /// Duplicate keys are summed.
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut dict = ValueDictionary::new();
        for (key, value) in iter {
            dict.add(&key, value);
        }
        dict
    }
}

impl<'a> FromIterator<(&'a str, f64)> for ValueDictionary {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut dict = ValueDictionary::new();
        for (key, value) in iter {
            dict.add(key, value);
        }
        dict
    }
}

/// Key → one value per snapshot, index-aligned.
///
/// Every array has exactly `snapshots` entries; a key missing from a
/// snapshot holds an explicit `0.0` in that slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonSeries {
    snapshots: usize,
    series: BTreeMap<String, Vec<f64>>,
}

impl ComparisonSeries {
    /// Build from pre-aligned rows. Rows shorter than `snapshots` are
    /// zero-padded and longer rows truncated so the alignment invariant holds.
    pub fn from_rows(snapshots: usize, rows: impl IntoIterator<Item = (String, Vec<f64>)>) -> Self {
        let series = rows
            .into_iter()
            .map(|(key, mut values)| {
                values.resize(snapshots, 0.0);
                (key, values)
            })
            .collect();
        Self { snapshots, series }
    }

    /// Number of snapshots every row spans.
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.series.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &[f64])> {
        self.series.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Column sums: the grand total of each snapshot.
    pub fn totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.snapshots];
        for values in self.series.values() {
            for (slot, value) in totals.iter_mut().zip(values) {
                *slot += value;
            }
        }
        totals
    }
}

/// One row of a bucketed dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketedEntry {
    pub label: String,
    pub value: f64,
    /// Fraction of the dataset total, in `[0, 1]`
    pub percentage: f64,
    /// True for the synthetic "other" bucket
    pub is_other: bool,
}

/// Bounded, sorted, presentation-ready dataset.
///
/// At most `max_visible + 1` entries; when present, the "other" entry is
/// always last. An empty dataset means "no data", not an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketedDataset {
    pub entries: Vec<BucketedEntry>,
    /// Grand total used for percentage math
    pub total: f64,
}

impl BucketedDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn other(&self) -> Option<&BucketedEntry> {
        self.entries.last().filter(|e| e.is_other)
    }

    /// Share of the total held by "other", `0.0` when absent.
    pub fn other_share(&self) -> f64 {
        self.other().map(|e| e.percentage).unwrap_or(0.0)
    }

    /// Sum of every entry, including "other".
    pub fn entries_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.value).sum()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

/// One labelled row of a bucketed multi-snapshot series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub label: String,
    /// One value per snapshot
    pub values: Vec<f64>,
    /// One percentage per snapshot, relative to that snapshot's total
    pub percentages: Vec<f64>,
    pub is_other: bool,
}

/// A [`ComparisonSeries`] reduced to a bounded set of rows plus "other".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketedSeries {
    pub entries: Vec<SeriesEntry>,
    /// Grand total of each snapshot
    pub totals: Vec<f64>,
}

impl BucketedSeries {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Diverging (positive/negative) stacked dataset.
///
/// Each stack index normalizes against its own magnitude sum, so
/// percentages read 0–100% on both sides of the axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StackedDataset {
    pub entries: Vec<SeriesEntry>,
    /// Σ|value| of each stack
    pub magnitudes: Vec<f64>,
}

impl StackedDataset {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}
