use std::collections::BTreeMap;

use crate::models::dataset::{ComparisonSeries, ValueDictionary};

/// Merges per-snapshot dictionaries into one index-aligned series.
pub struct ComparisonService;

impl ComparisonService {
    /// Slot `i` of every row is dictionary `i`'s value for that key, `0.0`
    /// when the key is absent. Keys seen in any single snapshot are kept.
    pub fn build(snapshots: &[ValueDictionary]) -> ComparisonSeries {
        let n = snapshots.len();
        let mut rows: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for (index, dict) in snapshots.iter().enumerate() {
            for (key, value) in dict.iter() {
                rows.entry(key.clone()).or_insert_with(|| vec![0.0; n])[index] += value;
            }
        }

        ComparisonSeries::from_rows(n, rows)
    }
}
