//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc band-pass kernels with MNE's
//!   automatic transition bandwidths.
//! - [`apply`]: zero-phase overlap-add convolution.

pub mod apply;
pub mod design;

pub use apply::FirFilter;
pub use design::{design_bandpass, firwin, hamming};
