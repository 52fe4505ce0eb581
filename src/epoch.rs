//! Trigger-locked epoching.
//!
//! Cuts `[tmin, tmax]` (both ends included) around each trigger sample from
//! a continuous [C, T] signal, for a subset of channels, and optionally
//! subtracts a per-channel baseline mean. A window that leaves the signal
//! is a [`DegenerateEpoch`](PipelineError::DegenerateEpoch); callers drop
//! the trial rather than pad it.
use ndarray::{s, Array2, Array3, Axis};

use crate::config::EpochWindow;
use crate::error::{PipelineError, Result};
use crate::normalize::baseline_correct_inplace;

/// Extract one epoch `[picks, n_samples]`.
pub fn extract_epoch(
    data: &Array2<f32>,
    sfreq: f64,
    trial: usize,
    trigger: i64,
    window: &EpochWindow,
    picks: &[usize],
) -> Result<Array2<f32>> {
    let len = window.n_samples(sfreq);
    let start = trigger + window.start_offset(sfreq);
    let available = data.ncols();
    if start < 0 || start as usize + len > available {
        return Err(PipelineError::DegenerateEpoch { trial, start, len, available });
    }
    let start = start as usize;
    let mut epoch = data
        .select(Axis(0), picks)
        .slice(s![.., start..start + len])
        .to_owned();
    if let Some((b0, b1)) = window.baseline {
        // The baseline end sample is included, as in MNE.
        let (i0, i1) = window.sample_range(b0, b1, sfreq);
        baseline_correct_inplace(&mut epoch, i0, (i1 + 1).min(len));
    }
    Ok(epoch)
}

/// Extract one epoch per trigger; degenerate windows become `None`.
pub fn extract_epochs(
    data: &Array2<f32>,
    sfreq: f64,
    triggers: &[i64],
    window: &EpochWindow,
    picks: &[usize],
) -> Vec<Option<Array2<f32>>> {
    triggers
        .iter()
        .enumerate()
        .map(|(trial, &trigger)| match extract_epoch(data, sfreq, trial, trigger, window, picks) {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                log::debug!("{e}");
                None
            }
        })
        .collect()
}

/// Stack the epochs of `trials` into `[trials, channels, samples]`.
///
/// Every listed trial must have an epoch.
pub fn stack(epochs: &[Option<Array2<f32>>], trials: &[usize], n_ch: usize, n_t: usize) -> Result<Array3<f32>> {
    let mut out = Array3::<f32>::zeros((trials.len(), n_ch, n_t));
    for (row, &trial) in trials.iter().enumerate() {
        let epoch = epochs
            .get(trial)
            .and_then(Option::as_ref)
            .ok_or_else(|| PipelineError::Format(format!("trial {trial} has no epoch")))?;
        out.slice_mut(s![row, .., ..]).assign(epoch);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n_ch: usize, n_t: usize) -> Array2<f32> {
        Array2::from_shape_fn((n_ch, n_t), |(c, t)| (c * 1000 + t) as f32)
    }

    #[test]
    fn window_includes_both_ends() {
        let data = ramp(2, 1000);
        let w = EpochWindow::new(-0.05, 0.15);
        let ep = extract_epoch(&data, 1000.0, 0, 100, &w, &[1]).unwrap();
        assert_eq!(ep.dim(), (1, 201));
        assert_eq!(ep[[0, 0]], 1050.0);
        assert_eq!(ep[[0, 200]], 1250.0);
    }

    #[test]
    fn baseline_zeroes_pre_trigger_mean() {
        let data = ramp(1, 1000);
        let w = EpochWindow::new(-0.05, 0.15).with_baseline(-0.05, 0.0);
        let ep = extract_epoch(&data, 1000.0, 0, 100, &w, &[0]).unwrap();
        // Baseline covers samples 50..=100, mean 75; trigger sample → 25.
        approx::assert_abs_diff_eq!(ep[[0, 50]], 25.0_f32, epsilon = 1e-4);
        let pre: f32 = ep.slice(s![0, 0..51]).mean().unwrap();
        approx::assert_abs_diff_eq!(pre, 0.0_f32, epsilon = 1e-4);
    }

    #[test]
    fn windows_past_either_end_are_degenerate() {
        let data = ramp(1, 300);
        let w = EpochWindow::new(-0.05, 0.15);
        let epochs = extract_epochs(&data, 1000.0, &[20, 100, 250], &w, &[0]);
        assert!(epochs[0].is_none());
        assert!(epochs[1].is_some());
        assert!(epochs[2].is_none());
        match extract_epoch(&data, 1000.0, 2, 250, &w, &[0]) {
            Err(PipelineError::DegenerateEpoch { trial, start, len, available }) => {
                assert_eq!((trial, start, len, available), (2, 200, 201, 300));
            }
            other => panic!("expected degenerate epoch, got {other:?}"),
        }
    }

    #[test]
    fn stack_selects_trials_in_order() {
        let data = ramp(1, 1000);
        let w = EpochWindow::new(0.0, 0.009);
        let epochs = extract_epochs(&data, 1000.0, &[0, 100, 200], &w, &[0]);
        let arr = stack(&epochs, &[2, 0], 1, 10).unwrap();
        assert_eq!(arr[[0, 0, 0]], 200.0);
        assert_eq!(arr[[1, 0, 9]], 9.0);
    }
}
