//! Windowed-sinc FIR design following `mne.filter.create_filter`
//! (`fir_window='hamming'`, `fir_design='firwin'`, `phase='zero'`).
//!
//! Transition bandwidths use MNE's automatic rules:
//!   • lower edge:  `min(max(0.25 · l_freq, 2), l_freq)`
//!   • upper edge:  `min(max(0.25 · h_freq, 2), nyquist − h_freq)`
//!   • length:      `ceil(3.3 / min(trans_bw) · sfreq)`, rounded to odd
use std::f64::consts::PI;

/// Transition bandwidth of a highpass edge at `l_freq`.
pub fn l_trans_bandwidth(l_freq: f32) -> f32 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// Transition bandwidth of a lowpass edge at `h_freq`.
pub fn h_trans_bandwidth(h_freq: f32, sfreq: f32) -> f32 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Odd number of taps for a given transition bandwidth.
pub fn auto_filter_length(trans_bw: f32, sfreq: f32) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Zero-phase band-pass between `l_freq` and `h_freq`.
///
/// Built as the difference of two lowpass kernels sharing the length
/// required by the narrower transition band.
pub fn design_bandpass(l_freq: f32, h_freq: f32, sfreq: f32) -> Vec<f32> {
    let l_tb = l_trans_bandwidth(l_freq);
    let h_tb = h_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(l_tb.min(h_tb), sfreq);
    let upper = firwin(n, h_freq + h_tb / 2.0, sfreq, true);
    let lower = firwin(n, l_freq - l_tb / 2.0, sfreq, true);
    upper.iter().zip(&lower).map(|(&u, &l)| (u - l) as f32).collect()
}

/// Hamming-windowed sinc with unit DC gain; `pass_zero = false` turns it
/// into a highpass by spectral inversion. `cutoff_hz` is the −6 dB point.
pub fn firwin(n: usize, cutoff_hz: f32, sfreq: f32, pass_zero: bool) -> Vec<f64> {
    debug_assert!(n % 2 == 1, "linear-phase FIR needs an odd length");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz as f64 / (sfreq as f64 / 2.0);
    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_are_odd() {
        for (l, h) in [(0.1_f32, 40.0_f32), (1.0, 30.0), (0.5, 100.0)] {
            assert_eq!(design_bandpass(l, h, 1000.0).len() % 2, 1);
        }
    }

    #[test]
    fn bandpass_blocks_dc() {
        let h = design_bandpass(1.0, 40.0, 250.0);
        let s: f32 = h.iter().sum();
        assert!(s.abs() < 1e-5, "band-pass DC gain = {s}");
    }

    #[test]
    fn spectral_inversion_blocks_dc() {
        let h = firwin(1691, 0.25, 256.0, false);
        let s: f64 = h.iter().sum();
        approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-9);
        assert_eq!(auto_filter_length(l_trans_bandwidth(0.5), 256.0), 1691);
    }

    #[test]
    fn bandpass_is_symmetric() {
        let h = design_bandpass(1.0, 40.0, 250.0);
        let n = h.len();
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-7_f32);
        }
    }
}
