//! Z-scores and baseline correction.
//!
//! `zscore`: corpus z-score `(x − mean) / std` over the non-missing values,
//!   sample std (ddof = 1). Missing values stay missing.
//!
//! `zscore_global_inplace`: one mean and std (ddof = 0) over every element.
//!
//! `baseline_correct_inplace`: `epoch[c, :] -= mean(epoch[c, b0..b1])`.
use ndarray::{Array2, ArrayViewMut1};

/// Mean of the non-NaN values, or NaN if there are none.
pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Sample standard deviation (ddof = 1) of the non-NaN values.
pub fn nanstd(values: &[f64]) -> f64 {
    let mean = nanmean(values);
    let (ss, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + (v - mean).powi(2), n + 1));
    if n < 2 { f64::NAN } else { (ss / (n - 1) as f64).sqrt() }
}

/// Z-score over the non-missing values. With fewer than two values or zero
/// spread every entry is missing.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let mean = nanmean(values);
    let std = nanstd(values);
    if !(std > 0.0) {
        return vec![f64::NAN; values.len()];
    }
    values.iter().map(|&v| (v - mean) / std).collect()
}

/// Global z-score of every element in place (ddof = 0).
/// Returns the (mean, std) used; a zero std leaves the data unchanged.
pub fn zscore_global_inplace<'a, I>(values: I) -> (f32, f32)
where
    I: IntoIterator<Item = &'a mut f32>,
{
    let mut refs: Vec<&mut f32> = values.into_iter().collect();
    let n = refs.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = refs.iter().map(|v| **v as f64).sum::<f64>() / n;
    let var = refs.iter().map(|v| (**v as f64 - mean).powi(2)).sum::<f64>() / n;
    let (mean, std) = (mean as f32, var.sqrt() as f32);
    if std > 0.0 {
        for v in refs.iter_mut() {
            **v = (**v - mean) / std;
        }
    }
    (mean, std)
}

/// Subtract the mean of `row[b0..b1]` from the whole row.
pub fn baseline_row_inplace(mut row: ArrayViewMut1<f32>, b0: usize, b1: usize) {
    let (b0, b1) = (b0.min(row.len()), b1.min(row.len()));
    if b1 <= b0 {
        return;
    }
    let m = row.slice(ndarray::s![b0..b1]).mean().unwrap_or(0.0);
    row.mapv_inplace(|v| v - m);
}

/// Per-channel baseline correction of one epoch `[C, T]`.
pub fn baseline_correct_inplace(epoch: &mut Array2<f32>, b0: usize, b1: usize) {
    for row in epoch.rows_mut() {
        baseline_row_inplace(row, b0, b1);
    }
}
