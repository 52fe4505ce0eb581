//! Morlet wavelet time-frequency power.
//!
//! For each frequency `f` the complex Morlet wavelet is
//! `w(t) = exp(2πi·f·t) · exp(−t² / 2σ²)` with `σ = n_cycles / (2π·f)`,
//! sampled over `±5σ` and scaled to unit energy. Power is `|x ∗ w|²` with
//! the convolution centred on the input (`mode='same'`).
//!
//! Epochs are cut with a margin on both sides; the margin is cropped after
//! the transform so the edge transients of the convolution never reach the
//! analysis window. Power is then z-scored separately for every frequency
//! band, over all trials, channels and samples of that band.
use std::f64::consts::PI;

use ndarray::{s, Array2, Array3, Array4, Axis};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::TfrConfig;
use crate::normalize::zscore_global_inplace;

/// Complex Morlet wavelet at `freq` Hz with `n_cycles` cycles.
pub fn morlet(freq: f64, n_cycles: f64, sfreq: f64) -> Vec<Complex<f64>> {
    let sigma = n_cycles / (2.0 * PI * freq);
    let half = (5.0 * sigma * sfreq).ceil() as i64;
    let mut w: Vec<Complex<f64>> = (-half..=half)
        .map(|i| {
            let t = i as f64 / sfreq;
            let envelope = (-t * t / (2.0 * sigma * sigma)).exp();
            Complex::from_polar(envelope, 2.0 * PI * freq * t)
        })
        .collect();
    let norm = w.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        w.iter_mut().for_each(|c| *c /= norm);
    }
    w
}

/// A bank of wavelets pre-transformed for signals of a fixed length.
pub struct WaveletBank {
    n_x: usize,
    n_fft: usize,
    /// `(kernel spectrum, offset of the centred output)` per frequency.
    kernels: Vec<(Vec<Complex<f64>>, usize)>,
}

impl WaveletBank {
    pub fn new(freqs: &[f64], cycles_divisor: f64, sfreq: f64, n_x: usize) -> Self {
        let wavelets: Vec<Vec<Complex<f64>>> = freqs
            .iter()
            .map(|&f| morlet(f, f / cycles_divisor, sfreq))
            .collect();
        let longest = wavelets.iter().map(Vec::len).max().unwrap_or(1);
        let n_fft = (n_x + longest - 1).next_power_of_two();

        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let kernels = wavelets
            .into_iter()
            .map(|w| {
                let offset = (w.len() - 1) / 2;
                let mut buf = w;
                buf.resize(n_fft, Complex::default());
                fwd.process(&mut buf);
                (buf, offset)
            })
            .collect();
        Self { n_x, n_fft, kernels }
    }

    pub fn n_freqs(&self) -> usize {
        self.kernels.len()
    }

    /// Power `[freqs, samples]` of one signal of the bank's length.
    pub fn power(&self, x: &[f32], planner: &mut FftPlanner<f64>) -> Array2<f32> {
        let fwd = planner.plan_fft_forward(self.n_fft);
        let inv = planner.plan_fft_inverse(self.n_fft);
        let mut spectrum: Vec<Complex<f64>> = x
            .iter()
            .map(|&v| Complex::new(v as f64, 0.0))
            .chain(std::iter::repeat(Complex::default()))
            .take(self.n_fft)
            .collect();
        fwd.process(&mut spectrum);

        let scale = 1.0 / self.n_fft as f64;
        let mut out = Array2::<f32>::zeros((self.kernels.len(), self.n_x));
        let mut buf = vec![Complex::default(); self.n_fft];
        for (fi, (kernel, offset)) in self.kernels.iter().enumerate() {
            for ((b, &s), &k) in buf.iter_mut().zip(&spectrum).zip(kernel) {
                *b = s * k;
            }
            inv.process(&mut buf);
            for (t, v) in out.row_mut(fi).iter_mut().enumerate() {
                *v = ((buf[t + offset] * scale).norm_sqr()) as f32;
            }
        }
        out
    }
}

/// Time-frequency power of padded epochs.
///
/// `epochs`: `[trials, channels, samples]` cut with `cfg.margin` seconds of
/// extra signal on each side. Returns `[trials, channels, freqs, samples']`
/// with the margin cropped, decimated by `cfg.decim` and z-scored per band.
pub fn epochs_power(epochs: &Array3<f32>, sfreq: f64, cfg: &TfrConfig) -> Array4<f32> {
    let (n_trials, n_ch, n_t) = epochs.dim();
    let freqs = cfg.freqs();
    let bank = WaveletBank::new(&freqs, cfg.cycles_divisor, sfreq, n_t);
    let margin = ((cfg.margin * sfreq).round() as usize).min(n_t / 2);
    let kept: Vec<usize> = (margin..n_t - margin).step_by(cfg.decim.max(1)).collect();

    let per_trial: Vec<Array3<f32>> = (0..n_trials)
        .into_par_iter()
        .map(|trial| {
            let mut planner = FftPlanner::new();
            let mut out = Array3::<f32>::zeros((n_ch, bank.n_freqs(), kept.len()));
            for ch in 0..n_ch {
                let x = epochs.slice(s![trial, ch, ..]).to_vec();
                let power = bank.power(&x, &mut planner).select(Axis(1), &kept);
                out.slice_mut(s![ch, .., ..]).assign(&power);
            }
            out
        })
        .collect();

    let mut out = Array4::<f32>::zeros((n_trials, n_ch, bank.n_freqs(), kept.len()));
    for (trial, power) in per_trial.into_iter().enumerate() {
        out.slice_mut(s![trial, .., .., ..]).assign(&power);
    }
    zscore_per_band_inplace(&mut out);
    out
}

/// Z-score `[trials, channels, freqs, samples]` separately for every
/// frequency index.
pub fn zscore_per_band_inplace(power: &mut Array4<f32>) {
    for f in 0..power.dim().2 {
        let mut band = power.slice_mut(s![.., .., f, ..]);
        zscore_global_inplace(band.iter_mut());
    }
}
