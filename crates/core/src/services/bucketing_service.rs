use std::cmp::Ordering;

use crate::models::dataset::{
    BucketedDataset, BucketedEntry, BucketedSeries, ComparisonSeries, SeriesEntry, StackedDataset,
    ValueDictionary,
};
use crate::models::settings::BucketingParams;

/// Turns unbounded dictionaries and series into capped, sorted datasets with
/// a synthetic "other" bucket.
///
/// Algorithm (shared by every variant, differing only in how an item is
/// ranked):
/// 1. `T` = sum of ranks. `T == 0` yields an empty dataset.
/// 2. Items ranked below `inclusion_threshold · T` are small and fold into "other".
/// 3. The rest are sorted descending; the first `max_visible` are shown and
///    the overflow also folds into "other".
/// 4. "Other" is appended last when its total is positive and either data
///    was truncated, small items were folded, or its share reaches
///    `display_threshold`.
///
/// Something lands in "other" only through truncation or a small item, so
/// the share test in step 4 never decides the outcome: a positive leftover
/// is always shown, whatever `display_threshold` is. A leftover whose total
/// is zero or negative is always hidden.
///
/// An item whose key equals the "other" label always folds, so the label
/// stays reserved for the synthetic bucket.
pub struct BucketingService;

/// Result of ranking and capping, as indices into the caller's item list.
struct Split {
    visible: Vec<usize>,
    folded: Vec<usize>,
    truncated: bool,
    any_small: bool,
}

impl Split {
    /// Step 4 of the algorithm. Any non-empty `folded` already implies
    /// `truncated || any_small`.
    fn shows_other(&self, other_rank: f64, total: f64, params: &BucketingParams) -> bool {
        other_rank > 0.0
            && (self.truncated || self.any_small || other_rank / total >= params.display_threshold)
    }
}

fn split(labels: &[&str], ranks: &[f64], total: f64, params: &BucketingParams) -> Split {
    let cutoff = params.inclusion_threshold * total;
    let mut large = Vec::new();
    let mut folded = Vec::new();
    let mut any_small = false;

    for (index, (label, rank)) in labels.iter().zip(ranks).enumerate() {
        if *rank < cutoff || *label == params.other_label {
            folded.push(index);
            any_small = true;
        } else {
            large.push(index);
        }
    }

    // Descending by rank; ties broken by label so output is stable.
    large.sort_by(|&a, &b| {
        ranks[b]
            .partial_cmp(&ranks[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| labels[a].cmp(labels[b]))
    });

    let truncated = large.len() > params.max_visible;
    if truncated {
        folded.extend(large.split_off(params.max_visible));
    }

    Split {
        visible: large,
        folded,
        truncated,
        any_small,
    }
}

fn ratio(value: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        value / total
    }
}

/// Index-wise sum of the given rows.
fn sum_rows(rows: &[&[f64]], indices: &[usize], width: usize) -> Vec<f64> {
    let mut out = vec![0.0; width];
    for &index in indices {
        for (slot, value) in out.iter_mut().zip(rows[index]) {
            *slot += value;
        }
    }
    out
}

impl BucketingService {
    /// Bucket one value dictionary. Percentages are `value / T`.
    pub fn bucket(dict: &ValueDictionary, params: &BucketingParams) -> BucketedDataset {
        let items: Vec<(&str, f64)> = dict
            .iter()
            .filter(|(_, value)| *value != 0.0)
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        let labels: Vec<&str> = items.iter().map(|(label, _)| *label).collect();
        let values: Vec<f64> = items.iter().map(|(_, value)| *value).collect();
        let total: f64 = values.iter().sum();

        if total == 0.0 {
            return BucketedDataset::empty();
        }

        let split = split(&labels, &values, total, params);
        let mut entries: Vec<BucketedEntry> = split
            .visible
            .iter()
            .map(|&i| BucketedEntry {
                label: labels[i].to_string(),
                value: values[i],
                percentage: ratio(values[i], total),
                is_other: false,
            })
            .collect();

        let other_total: f64 = split.folded.iter().map(|&i| values[i]).sum();
        if split.shows_other(other_total, total, params) {
            entries.push(BucketedEntry {
                label: params.other_label.clone(),
                value: other_total,
                percentage: ratio(other_total, total),
                is_other: true,
            });
        }

        BucketedDataset { entries, total }
    }

    /// Bucket a multi-snapshot series. Rows are ranked by their sum across
    /// snapshots; the "other" row is the index-wise sum of every folded row.
    /// Percentages are relative to each snapshot's total.
    pub fn bucket_series(series: &ComparisonSeries, params: &BucketingParams) -> BucketedSeries {
        let width = series.snapshots();
        let (labels, rows): (Vec<&str>, Vec<&[f64]>) = series
            .iter()
            .filter(|(_, values)| values.iter().any(|v| *v != 0.0))
            .map(|(key, values)| (key.as_str(), values))
            .unzip();
        let ranks: Vec<f64> = rows.iter().map(|values| values.iter().sum()).collect();
        let total: f64 = ranks.iter().sum();

        if total == 0.0 {
            return BucketedSeries::default();
        }

        let totals = series.totals();
        let percentages = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&totals)
                .map(|(value, column)| ratio(*value, *column))
                .collect()
        };

        let split = split(&labels, &ranks, total, params);
        let mut entries: Vec<SeriesEntry> = split
            .visible
            .iter()
            .map(|&i| SeriesEntry {
                label: labels[i].to_string(),
                values: rows[i].to_vec(),
                percentages: percentages(rows[i]),
                is_other: false,
            })
            .collect();

        let other_rank: f64 = split.folded.iter().map(|&i| ranks[i]).sum();
        if split.shows_other(other_rank, total, params) {
            let values = sum_rows(&rows, &split.folded, width);
            entries.push(SeriesEntry {
                label: params.other_label.clone(),
                percentages: percentages(&values),
                values,
                is_other: true,
            });
        }

        BucketedSeries { entries, totals }
    }

    /// Sign-aware bucketing for diverging stacks (net flows and the like).
    ///
    /// Each row is ranked by its total magnitude across every stack, so a row
    /// that flips sign between stacks is judged by its aggregate absolute
    /// contribution. Within a stack, percentages are `|value| / Σ|values|` of
    /// that stack.
    pub fn bucket_diverging(
        series: &ComparisonSeries,
        params: &BucketingParams,
    ) -> StackedDataset {
        let width = series.snapshots();
        let (labels, rows): (Vec<&str>, Vec<&[f64]>) = series
            .iter()
            .filter(|(_, values)| values.iter().any(|v| *v != 0.0))
            .map(|(key, values)| (key.as_str(), values))
            .unzip();
        let ranks: Vec<f64> = rows
            .iter()
            .map(|values| values.iter().map(|v| v.abs()).sum())
            .collect();
        let total: f64 = ranks.iter().sum();

        if total == 0.0 {
            return StackedDataset::default();
        }

        let split = split(&labels, &ranks, total, params);
        let mut rows_out: Vec<(String, Vec<f64>, bool)> = split
            .visible
            .iter()
            .map(|&i| (labels[i].to_string(), rows[i].to_vec(), false))
            .collect();

        let other_rank: f64 = split.folded.iter().map(|&i| ranks[i]).sum();
        if split.shows_other(other_rank, total, params) {
            rows_out.push((
                params.other_label.clone(),
                sum_rows(&rows, &split.folded, width),
                true,
            ));
        }

        let mut magnitudes = vec![0.0; width];
        for (_, values, _) in &rows_out {
            for (slot, value) in magnitudes.iter_mut().zip(values) {
                *slot += value.abs();
            }
        }

        let entries = rows_out
            .into_iter()
            .map(|(label, values, is_other)| SeriesEntry {
                percentages: values
                    .iter()
                    .zip(&magnitudes)
                    .map(|(value, magnitude)| ratio(value.abs(), *magnitude))
                    .collect(),
                label,
                values,
                is_other,
            })
            .collect();

        StackedDataset {
            entries,
            magnitudes,
        }
    }
}
