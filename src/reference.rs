//! Re-referencing: subtract a per-timepoint reference signal from a set of
//! channels.
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[refs, t])` for every `c` in `targets`.
use ndarray::{Array1, Array2, Axis};

/// Per-timepoint mean of the rows in `refs`.
pub fn reference_signal(data: &Array2<f32>, refs: &[usize]) -> Array1<f32> {
    if refs.is_empty() {
        return Array1::zeros(data.ncols());
    }
    data.select(Axis(0), refs).mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(data.ncols()))
}

/// Subtract the mean of the `refs` rows from each of the `targets` rows.
pub fn rereference_inplace(data: &mut Array2<f32>, refs: &[usize], targets: &[usize]) {
    let reference = reference_signal(data, refs);
    for &c in targets {
        let mut row = data.row_mut(c);
        row -= &reference;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sum_is_zero_after_average_reference() {
        let mut data = Array2::from_shape_fn((8, 512), |(c, t)| ((c * 7 + t * 3) as f32).sin());
        let all: Vec<usize> = (0..8).collect();
        rereference_inplace(&mut data, &all, &all);
        for &s in data.sum_axis(Axis(0)).iter() {
            approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-4_f32);
        }
    }

    #[test]
    fn untargeted_rows_are_left_alone() {
        let mut data = Array2::from_shape_fn((3, 10), |(c, _)| c as f32 + 1.0);
        rereference_inplace(&mut data, &[2], &[0]);
        assert!(data.row(0).iter().all(|&v| v == -2.0));
        assert!(data.row(1).iter().all(|&v| v == 2.0));
        assert!(data.row(2).iter().all(|&v| v == 3.0));
    }

    #[test]
    fn mastoid_pair_reference() {
        // Reference = mean(2, 4) = 3 → channel 0 (value 5) becomes 2.
        let mut data = Array2::from_shape_fn((3, 4), |(c, _)| [5.0_f32, 2.0, 4.0][c]);
        rereference_inplace(&mut data, &[1, 2], &[0]);
        assert!(data.row(0).iter().all(|&v| v == 2.0));
    }
}
