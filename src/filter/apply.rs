//! Zero-phase FIR application by overlap-add FFT convolution.
//!
//! The output is shifted left by `(N − 1) / 2` samples instead of running the
//! filter twice. Edges are padded with `N − 1` samples of odd reflection
//! (MNE's `_smart_pad`) to suppress transients.
use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// A FIR kernel with its forward and inverse plans prepared for a fixed
/// signal length, reusable across channels.
pub struct FirFilter {
    n_taps: usize,
    n_fft: usize,
    h_fft: Vec<Complex<f32>>,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
}

impl FirFilter {
    /// Prepare `h` (odd length) for signals of `n_x` samples.
    pub fn new(h: &[f32], n_x: usize) -> Self {
        let n_taps = h.len();
        let n_fft = choose_fft_len(n_taps, n_x + 2 * (n_taps - 1));
        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let inv = planner.plan_fft_inverse(n_fft);
        let mut h_fft = zero_padded(h, n_fft);
        fwd.process(&mut h_fft);
        Self { n_taps, n_fft, h_fft, fwd, inv }
    }

    /// Filter one signal; the output has the input's length.
    pub fn apply(&self, x: &[f32]) -> Vec<f32> {
        let n_x = x.len();
        if n_x == 0 {
            return vec![];
        }
        let shift = (self.n_taps - 1) / 2;
        let n_edge = self.n_taps - 1;
        let x_ext = odd_reflect_pad(x, n_edge);
        let n_ext = x_ext.len();

        let n_seg = self.n_fft - self.n_taps + 1;
        let scale = 1.0 / self.n_fft as f32;
        let mut y = vec![0.0_f32; n_ext];

        for start in (0..n_ext).step_by(n_seg) {
            let stop = (start + n_seg).min(n_ext);
            let mut buf = zero_padded(&x_ext[start..stop], self.n_fft);
            self.fwd.process(&mut buf);
            for (b, &hf) in buf.iter_mut().zip(&self.h_fft) {
                *b *= hf;
            }
            self.inv.process(&mut buf);

            // Output sample o receives product sample o + shift - start.
            let first = start.saturating_sub(shift);
            let skip = shift.saturating_sub(start);
            for (o, p) in (first..n_ext).zip(skip..self.n_fft) {
                y[o] += buf[p].re * scale;
            }
        }
        y[n_edge..n_edge + n_x].to_vec()
    }

    /// Filter the listed rows of `data` ([C, T]) in place.
    pub fn apply_rows(&self, data: &mut Array2<f32>, rows: &[usize]) {
        for &r in rows {
            let filtered = self.apply(&data.row(r).to_vec());
            data.row_mut(r).assign(&ndarray::ArrayView1::from(&filtered));
        }
    }
}

fn zero_padded(x: &[f32], n: usize) -> Vec<Complex<f32>> {
    x.iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n)
        .collect()
}

/// Odd reflection around the end samples, zero-filled when the signal is
/// shorter than the requested padding:
/// `pad_left[i] = 2·x[0] − x[i]`, `pad_right[i] = 2·x[n−1] − x[n−1−i]`.
fn odd_reflect_pad(x: &[f32], n_pad: usize) -> Vec<f32> {
    let n = x.len();
    let avail = n_pad.min(n - 1);
    let mut out = Vec::with_capacity(n + 2 * n_pad);
    out.extend(std::iter::repeat(0.0).take(n_pad - avail));
    out.extend((1..=avail).rev().map(|i| 2.0 * x[0] - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=avail).map(|i| 2.0 * x[n - 1] - x[n - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(n_pad - avail));
    out
}

/// Power-of-two block size minimising MNE's overlap-add cost estimate
/// `ceil(n_x / (N − n_h + 1)) · N · (log2 N + 1) + 4e-5 · N · n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;
    let max_pow = ((n_x as f64).log2().ceil() as u32 + 1).max(min_pow);
    (min_pow..=max_pow)
        .map(|pow| {
            let n = 1_usize << pow;
            let n_seg = (n - n_h + 1) as f64;
            let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
                + 4e-5 * n as f64 * n_x as f64;
            (n, cost)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(n, _)| n)
        .unwrap_or(1 << min_pow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::design::design_bandpass;

    #[test]
    fn preserves_length() {
        let x: Vec<f32> = (0..1024).map(|i| (i as f32 / 50.0).sin()).collect();
        let f = FirFilter::new(&design_bandpass(1.0, 40.0, 256.0), x.len());
        assert_eq!(f.apply(&x).len(), x.len());
    }

    #[test]
    fn bandpass_removes_dc() {
        let x = vec![1.0_f32; 4096];
        let h = design_bandpass(1.0, 40.0, 256.0);
        let y = FirFilter::new(&h, x.len()).apply(&x);
        let n_h = h.len();
        let max_val = y[n_h..y.len() - n_h].iter().map(|v| v.abs()).fold(0.0_f32, f32::max);
        assert!(max_val < 1e-3, "DC not removed: max={max_val}");
    }

    #[test]
    fn bandpass_keeps_in_band_sine() {
        let sfreq = 250.0_f32;
        let x: Vec<f32> = (0..5000)
            .map(|i| (2.0 * std::f32::consts::PI * 10.0 * i as f32 / sfreq).sin())
            .collect();
        let h = design_bandpass(1.0, 40.0, sfreq);
        let y = FirFilter::new(&h, x.len()).apply(&x);
        let mid = 2000..3000;
        let err = mid.map(|i| (y[i] - x[i]).abs()).fold(0.0_f32, f32::max);
        assert!(err < 0.02, "10 Hz sine distorted by {err}");
    }

    #[test]
    fn odd_reflection_left_edge() {
        let x = [1.0_f32, 2.0, 3.0, 4.0, 5.0];
        let padded = odd_reflect_pad(&x, 3);
        assert_eq!(&padded[..3], &[-2.0_f32, -1.0, 0.0]);
        assert_eq!(&padded[3..8], &x[..]);
        assert_eq!(&padded[8..], &[6.0_f32, 7.0, 8.0]);
    }

    #[test]
    fn short_signal_is_zero_padded() {
        let padded = odd_reflect_pad(&[1.0_f32, 3.0], 3);
        assert_eq!(padded, vec![0.0, 0.0, -1.0, 1.0, 3.0, 5.0, 0.0, 0.0]);
    }
}
